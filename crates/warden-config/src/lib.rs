//! # warden-config
//!
//! Configuration system for Warden. Reads from `warden.toml` and environment
//! variables, in that precedence order, environment last.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    BUILTIN_TASKS, BackendConfig, ConfigWarning, GateConfig, HierarchyConfig, LedgerConfig,
    LoggingConfig, RouterConfig, RuleConfig, SchedulerConfig, StoreConfig, TaskConfig,
    WarningSeverity, WardenConfig,
};
