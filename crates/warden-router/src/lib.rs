//! # warden-router
//!
//! Backend selection under a cost budget. Holds the backend registry, the
//! cost router that ranks eligible backends, the dispatcher that invokes the
//! chosen backend with a single failover, and the backend clients (HTTP for
//! Ollama-compatible servers, mock for tests).

pub mod dispatch;
pub mod http;
pub mod mock;
pub mod registry;
pub mod router;

pub use dispatch::{BackendStats, Dispatch, Dispatcher};
pub use http::HttpBackendClient;
pub use registry::{BackendProfile, BackendRegistry};
pub use router::{BudgetState, CostRouter, RoutingDecision, TaskProfile};
