use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use warden_core::{BackendClient, BackendId, WardenError};

use crate::router::{BudgetState, CostRouter, RoutingDecision, TaskProfile};

/// A completed backend invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    /// Decision for the backend that actually answered.
    pub decision: RoutingDecision,
    pub output: String,
    pub units: u64,
    /// Units consumed × cost-per-unit of the answering backend.
    pub actual_cost: f64,
    /// Backend that faulted before the failover, if any.
    pub failed_over_from: Option<BackendId>,
}

/// Per-backend call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStats {
    pub successes: u64,
    pub faults: u64,
}

/// Routes a task and invokes the chosen backend, failing over once.
pub struct Dispatcher {
    router: CostRouter,
    client: Arc<dyn BackendClient>,
    stats: Mutex<HashMap<BackendId, BackendStats>>,
}

impl Dispatcher {
    pub fn new(router: CostRouter, client: Arc<dyn BackendClient>) -> Self {
        Self {
            router,
            client,
            stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn router(&self) -> &CostRouter {
        &self.router
    }

    /// Route `task` and send `payload` to the chosen backend.
    ///
    /// On a backend fault the next-best eligible backend is tried exactly once;
    /// a second fault is surfaced as `BackendFault`. The fallback passes the
    /// same marginal-value check as the primary route.
    pub async fn dispatch(
        &self,
        task: &TaskProfile,
        budget: &BudgetState,
        payload: &str,
    ) -> warden_core::Result<Dispatch> {
        let primary = self.router.route(task, budget)?;
        let first_err = match self.invoke(&primary, payload).await {
            Ok(dispatch) => return Ok(dispatch),
            Err(e) => e,
        };

        let fallback = self
            .router
            .ranked(task, budget)
            .into_iter()
            .find(|p| p.id != primary.backend_id);
        let Some(fallback) = fallback else {
            warn!(request_id = %task.request_id, backend = %primary.backend_id, "no failover backend available");
            return Err(first_err);
        };

        warn!(
            request_id = %task.request_id,
            from = %primary.backend_id,
            to = %fallback.id,
            error = %first_err,
            "backend fault, failing over"
        );
        let decision = self.router.decide(&fallback, task);
        if self.router.check_marginal_value(task, &decision).is_err() {
            return Err(first_err);
        }
        let mut dispatch = self.invoke(&decision, payload).await?;
        dispatch.failed_over_from = Some(primary.backend_id);
        Ok(dispatch)
    }

    async fn invoke(&self, decision: &RoutingDecision, payload: &str) -> warden_core::Result<Dispatch> {
        match self.client.invoke(&decision.backend_id, payload).await {
            Ok(invocation) => {
                self.stats.lock().entry(decision.backend_id.clone()).or_default().successes += 1;
                let actual_cost = invocation.units as f64 * decision.cost_per_unit;
                info!(
                    request_id = %decision.request_id,
                    backend = %decision.backend_id,
                    units = invocation.units,
                    actual_cost,
                    "backend invocation complete"
                );
                Ok(Dispatch {
                    decision: decision.clone(),
                    output: invocation.output,
                    units: invocation.units,
                    actual_cost,
                    failed_over_from: None,
                })
            }
            Err(e) => {
                self.stats.lock().entry(decision.backend_id.clone()).or_default().faults += 1;
                warn!(request_id = %decision.request_id, backend = %decision.backend_id, error = %e, "backend invocation failed");
                Err(match e {
                    fault @ WardenError::BackendFault { .. } => fault,
                    other => WardenError::BackendFault {
                        backend: decision.backend_id.clone(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    /// Call counters per backend id.
    pub fn stats(&self) -> HashMap<BackendId, BackendStats> {
        self.stats.lock().clone()
    }
}
