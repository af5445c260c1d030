use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use warden_core::{BackendId, RequestId, WardenError};

use crate::registry::{BackendProfile, BackendRegistry};

/// What a request needs from a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProfile {
    pub request_id: RequestId,
    pub min_tier: u8,
    pub estimated_units: u64,
    pub estimated_value: f64,
}

/// The ledger's view at routing time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub balance: f64,
    pub floor: f64,
}

impl BudgetState {
    pub fn below_floor(&self) -> bool {
        self.balance < self.floor
    }
}

/// The backend chosen for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub request_id: RequestId,
    pub backend_id: BackendId,
    pub cost_per_unit: f64,
    pub estimated_cost: f64,
    /// Estimated task value minus estimated cost.
    pub marginal_value: f64,
}

/// Picks the cheapest eligible backend for a task under the current budget.
#[derive(Clone)]
pub struct CostRouter {
    registry: Arc<BackendRegistry>,
    gate_on_marginal_value: bool,
}

impl CostRouter {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            gate_on_marginal_value: false,
        }
    }

    /// Refuse to route tasks whose marginal value is negative.
    pub fn gate_on_marginal_value(mut self, gate: bool) -> Self {
        self.gate_on_marginal_value = gate;
        self
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Eligible backends, best first: lowest cost, then highest tier, then id.
    pub fn ranked(&self, task: &TaskProfile, budget: &BudgetState) -> Vec<BackendProfile> {
        let below_floor = budget.below_floor();
        let mut eligible: Vec<BackendProfile> = self
            .registry
            .profiles()
            .into_iter()
            .filter(|p| p.available && p.tier >= task.min_tier)
            .filter(|p| !below_floor || p.local)
            .collect();
        eligible.sort_by(|a, b| {
            a.cost_per_unit
                .total_cmp(&b.cost_per_unit)
                .then_with(|| b.tier.cmp(&a.tier))
                .then_with(|| a.id.cmp(&b.id))
        });
        eligible
    }

    /// Choose a backend. Returns `NoEligibleBackend` when nothing qualifies;
    /// the caller must not execute in that case.
    pub fn route(&self, task: &TaskProfile, budget: &BudgetState) -> warden_core::Result<RoutingDecision> {
        let Some(best) = self.ranked(task, budget).into_iter().next() else {
            let reason = if budget.below_floor() {
                format!(
                    "balance {:.2} is below the floor {:.2} and no available local backend has tier >= {}",
                    budget.balance, budget.floor, task.min_tier
                )
            } else {
                format!("no available backend has tier >= {}", task.min_tier)
            };
            warn!(request_id = %task.request_id, reason = %reason, "no eligible backend");
            return Err(WardenError::NoEligibleBackend {
                request_id: task.request_id,
                reason,
            });
        };

        let decision = self.decide(&best, task);
        info!(
            request_id = %task.request_id,
            backend = %decision.backend_id,
            estimated_cost = decision.estimated_cost,
            marginal_value = decision.marginal_value,
            "routing decision"
        );

        self.check_marginal_value(task, &decision)?;
        Ok(decision)
    }

    /// Refuse `decision` when gating is on and its marginal value is negative.
    pub fn check_marginal_value(&self, task: &TaskProfile, decision: &RoutingDecision) -> warden_core::Result<()> {
        if self.gate_on_marginal_value && decision.marginal_value < 0.0 {
            warn!(
                request_id = %task.request_id,
                backend = %decision.backend_id,
                marginal_value = decision.marginal_value,
                "marginal value negative, refusing to route"
            );
            return Err(WardenError::NoEligibleBackend {
                request_id: task.request_id,
                reason: format!(
                    "estimated cost {:.4} exceeds estimated value {:.4}",
                    decision.estimated_cost, task.estimated_value
                ),
            });
        }
        Ok(())
    }

    /// Decision record for routing `task` to `profile`.
    pub fn decide(&self, profile: &BackendProfile, task: &TaskProfile) -> RoutingDecision {
        let estimated_cost = task.estimated_units as f64 * profile.cost_per_unit;
        RoutingDecision {
            request_id: task.request_id,
            backend_id: profile.id.clone(),
            cost_per_unit: profile.cost_per_unit,
            estimated_cost,
            marginal_value: task.estimated_value - estimated_cost,
        }
    }
}
