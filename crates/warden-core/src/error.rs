use thiserror::Error;
use uuid::Uuid;

use crate::types::{DialogueStage, RequestId};

/// Unified error type for the entire Warden workspace.
#[derive(Error, Debug)]
pub enum WardenError {
    // ── Policy errors ──────────────────────────────────────────
    #[error("policy violation: request {request_id}: {rationale}")]
    PolicyViolation {
        request_id: RequestId,
        rationale: String,
    },

    #[error("safety lock-out: request {request_id} blocked by {rules:?}; explicit risk acknowledgment required")]
    SafetyLockout {
        request_id: RequestId,
        rules: Vec<String>,
    },

    #[error("no lock-out recorded for request {0}")]
    UnknownLockout(RequestId),

    #[error("risk acknowledgment rejected: {0}")]
    AcknowledgmentRejected(String),

    #[error("request {0} is not in the risk backlog")]
    NotPending(RequestId),

    #[error("dismissal rejected: {0}")]
    DismissRejected(String),

    #[error("audit log append failed: {0}")]
    Audit(String),

    // ── Routing / backend errors ───────────────────────────────
    #[error("no eligible backend for request {request_id}: {reason}")]
    NoEligibleBackend {
        request_id: RequestId,
        reason: String,
    },

    #[error("backend fault: {backend}: {reason}")]
    BackendFault { backend: String, reason: String },

    #[error("backend not found: {0}")]
    UnknownBackend(String),

    // ── Dialogue errors ────────────────────────────────────────
    #[error("dialogue session {session_id} aborted; request {request_id} left unresolved")]
    SessionAborted {
        session_id: Uuid,
        request_id: RequestId,
    },

    #[error("dialogue session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("input '{input}' is not valid at stage {stage}")]
    InvalidTransition { stage: DialogueStage, input: String },

    // ── Ledger / scheduling errors ─────────────────────────────
    #[error("request {0} already has a transaction")]
    DuplicateTransaction(RequestId),

    #[error("task not found: {0}")]
    UnknownTask(String),

    // ── Store / config errors ──────────────────────────────────
    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// The operator-facing fault taxonomy. Every `WardenError` maps onto one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Block verdict, surfaced with rationale, never retried.
    PolicyViolation,
    /// No eligible backend under the current budget; the action is deferred.
    BudgetExceeded,
    /// Backend invocation failed after the single failover attempt.
    BackendFault,
    /// Dialogue cancelled by the operator; the request stays unresolved.
    SessionAborted,
    /// Catastrophic block; only an explicit risk acknowledgment clears it.
    SafetyLockout,
    /// Store, config, io and bookkeeping faults.
    Internal,
}

impl WardenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PolicyViolation { .. } => ErrorKind::PolicyViolation,
            Self::SafetyLockout { .. }
            | Self::UnknownLockout(_)
            | Self::AcknowledgmentRejected(_) => ErrorKind::SafetyLockout,
            Self::NoEligibleBackend { .. } => ErrorKind::BudgetExceeded,
            Self::BackendFault { .. } | Self::UnknownBackend(_) => ErrorKind::BackendFault,
            Self::SessionAborted { .. } => ErrorKind::SessionAborted,
            _ => ErrorKind::Internal,
        }
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
