use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What a backend returned for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// The backend's answer.
    pub output: String,
    /// Billable units consumed (tokens for inference services).
    pub units: u64,
}

/// The narrow request/response interface to the external inference services.
///
/// One client multiplexes every configured backend; the router decides which
/// `backend_id` to ask.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Invoke `backend_id` with `payload`. Any `Err` is treated as a backend fault.
    async fn invoke(&self, backend_id: &str, payload: &str) -> crate::Result<Invocation>;
}
