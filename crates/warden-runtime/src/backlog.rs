use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use warden_core::{ActionRequest, RequestId};
use warden_policy::PolicyVerdict;

use crate::governor::ExecutionHints;

/// Why a request is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingReason {
    /// A dialogue session is discussing it.
    InDialogue,
    /// Blocked by a catastrophic rule or a rule fault; needs a risk acknowledgment.
    Lockout,
    /// The operator cancelled the dialogue.
    Aborted,
}

impl fmt::Display for PendingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InDialogue => "in dialogue",
            Self::Lockout => "lock-out",
            Self::Aborted => "aborted",
        })
    }
}

/// An unresolved flagged or blocked request.
#[derive(Debug, Clone, Serialize)]
pub struct PendingRequest {
    pub request: ActionRequest,
    pub reason: PendingReason,
    pub rationale: String,
    /// Rules named by the lock-out, empty otherwise.
    pub lockout_rules: Vec<String>,
    /// Routing hints to reuse when the request re-enters the gate.
    pub hints: ExecutionHints,
    pub since: DateTime<Utc>,
}

impl PendingRequest {
    pub fn new(
        request: ActionRequest,
        reason: PendingReason,
        verdict: &PolicyVerdict,
        hints: ExecutionHints,
    ) -> Self {
        Self {
            request,
            reason,
            rationale: verdict.rationale().to_string(),
            lockout_rules: verdict.lockout_rules(),
            hints,
            since: Utc::now(),
        }
    }
}

/// Requests that were flagged or blocked and have not been resolved yet.
///
/// Its size is the "unresolved flags" signal fed to the gate and the needs
/// hierarchy.
#[derive(Default)]
pub struct RiskBacklog {
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
}

impl RiskBacklog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pending: PendingRequest) {
        self.pending.lock().insert(pending.request.id(), pending);
    }

    /// Remove `request_id` and return what was pending for it.
    pub fn resolve(&self, request_id: RequestId) -> Option<PendingRequest> {
        self.pending.lock().remove(&request_id)
    }

    /// Change the reason a request is open. Returns false if it is not pending.
    pub fn mark(&self, request_id: RequestId, reason: PendingReason) -> bool {
        match self.pending.lock().get_mut(&request_id) {
            Some(p) => {
                p.reason = reason;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, request_id: RequestId) -> Option<PendingRequest> {
        self.pending.lock().get(&request_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All pending requests, oldest first.
    pub fn list(&self) -> Vec<PendingRequest> {
        let mut all: Vec<_> = self.pending.lock().values().cloned().collect();
        all.sort_by_key(|p| p.since);
        all
    }
}
