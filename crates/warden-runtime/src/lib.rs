//! # warden-runtime
//!
//! The governance loop. Connects the policy gate, dialogue engine, cost
//! router, ledger, needs hierarchy and task scheduler.
//!
//! ## Architecture
//!
//! ```text
//!   operator request                      tick
//!          │                               │
//!          ▼                               ▼
//!   ┌─────────────┐                 ┌───────────────┐
//!   │  Governor   │                 │ TaskScheduler │
//!   │             │                 │               │
//!   │ 1. Gate     │ ← audit log     │ admit if tier │ ← HierarchyManager
//!   │ 2. Dialogue │ ← operator      │ run w/timeout │
//!   │ 3. Route    │ ← CostRouter    │ record run    │ → task_runs
//!   │ 4. Charge   │ → Ledger        └───────┬───────┘
//!   └──────┬──────┘                         │
//!          └──────── re-evaluate tier ──────┘
//! ```

pub mod backlog;
pub mod commands;
pub mod governor;
pub mod ledger;
pub mod maintenance;
pub mod runtime;
pub mod scheduler;

pub use backlog::{PendingReason, PendingRequest, RiskBacklog};
pub use commands::{
    BackendReport, CommandOutput, EconomicsReport, HierarchyReport, OperatorCommand, StatusReport,
    TasksReport,
};
pub use governor::{Execution, ExecutionHints, Governor, Submission};
pub use ledger::Ledger;
pub use maintenance::{
    BalanceStatus, HealthGauge, MaintenanceTask, ResourceSample, Vitals, builtin_task,
};
pub use runtime::WardenRuntime;
pub use scheduler::{TaskScheduler, TaskStatus};
