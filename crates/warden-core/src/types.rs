use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an action request.
pub type RequestId = Uuid;

/// Unique identifier for a dialogue session.
pub type SessionId = Uuid;

/// Unique identifier for a backend profile.
pub type BackendId = String;

/// Who proposed an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Originator {
    Operator,
    Agent,
    Task { name: String },
}

impl fmt::Display for Originator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operator => write!(f, "operator"),
            Self::Agent => write!(f, "agent"),
            Self::Task { name } => write!(f, "task:{name}"),
        }
    }
}

/// A proposed action. Never mutated after construction; revisions produce a
/// successor with a fresh id that points back through `supersedes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    id: RequestId,
    description: String,
    urgent: bool,
    originator: Originator,
    supersedes: Option<RequestId>,
    created_at: DateTime<Utc>,
}

impl ActionRequest {
    pub fn new(description: impl Into<String>, originator: Originator) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            urgent: false,
            originator,
            supersedes: None,
            created_at: Utc::now(),
        }
    }

    /// Shorthand for an operator-originated request.
    pub fn operator(description: impl Into<String>) -> Self {
        Self::new(description, Originator::Operator)
    }

    /// Mark the request urgent (skips the dialogue, never the gate).
    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }

    /// A new request carrying the same intent, linked to this one.
    pub fn successor(&self) -> Self {
        self.revised(self.description.clone())
    }

    /// A new request with corrected text, linked to this one.
    pub fn revised(&self, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            urgent: self.urgent,
            originator: self.originator.clone(),
            supersedes: Some(self.id),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_urgent(&self) -> bool {
        self.urgent
    }

    pub fn originator(&self) -> &Originator {
        &self.originator
    }

    pub fn supersedes(&self) -> Option<RequestId> {
        self.supersedes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Severity tag carried by every mandate rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Raises a flag; the operator is consulted.
    Caution,
    /// Blocks; an operator override in dialogue may waive it.
    Critical,
    /// Blocks immediately and locks the request out.
    Catastrophic,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Caution => "caution",
            Self::Critical => "critical",
            Self::Catastrophic => "catastrophic",
        })
    }
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Allow,
    Flag,
    Block,
}

impl Outcome {
    pub fn from_severity(severity: Option<Severity>) -> Self {
        match severity {
            None => Self::Allow,
            Some(Severity::Caution) => Self::Flag,
            Some(Severity::Critical | Severity::Catastrophic) => Self::Block,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Flag => "flag",
            Self::Block => "block",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Self::Allow),
            "flag" => Some(Self::Flag),
            "block" => Some(Self::Block),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Four ordered operating modes gating which background tasks may run.
///
/// - **Physiological**: keep the lights on: balance and host resources.
/// - **Growth**: extend capabilities while error rates stay low.
/// - **Cognitive**: reflect and optimise once the risk backlog is clear.
/// - **SelfActualization**: proactive assistance while the balance grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NeedsTier {
    Physiological = 1,
    Growth = 2,
    Cognitive = 3,
    SelfActualization = 4,
}

impl NeedsTier {
    pub const ALL: [NeedsTier; 4] = [
        Self::Physiological,
        Self::Growth,
        Self::Cognitive,
        Self::SelfActualization,
    ];

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Physiological),
            2 => Some(Self::Growth),
            3 => Some(Self::Cognitive),
            4 => Some(Self::SelfActualization),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// The tier above this one, if any.
    pub fn next(&self) -> Option<Self> {
        Self::from_u8(self.as_u8() + 1)
    }

    /// The tier below this one, if any.
    pub fn prev(&self) -> Option<Self> {
        self.as_u8().checked_sub(1).and_then(Self::from_u8)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Physiological => "Physiological",
            Self::Growth => "Growth",
            Self::Cognitive => "Cognitive",
            Self::SelfActualization => "SelfActualization",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Physiological => "Physiological & security needs: balance and host resources",
            Self::Growth => "Growth & capability needs: extend what the agent can do",
            Self::Cognitive => "Cognitive & esteem needs: reflection and self-improvement",
            Self::SelfActualization => "Self-actualization: proactive assistance toward operator goals",
        }
    }

    /// Case-insensitive parse of the tier name (or its 1-based number).
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(n) = s.parse::<u8>() {
            return Self::from_u8(n);
        }
        let lower = s.to_ascii_lowercase().replace(['_', '-', ' '], "");
        Self::ALL
            .into_iter()
            .find(|t| t.name().to_ascii_lowercase() == lower)
    }
}

impl fmt::Display for NeedsTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{} ({})", self.as_u8(), self.name())
    }
}

/// Stages of a dialogue session, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueStage {
    Understanding,
    RiskIdentification,
    Alternative,
    Recommendation,
    Resolved,
}

impl DialogueStage {
    /// The next stage in the fixed sequence.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Understanding => Some(Self::RiskIdentification),
            Self::RiskIdentification => Some(Self::Alternative),
            Self::Alternative => Some(Self::Recommendation),
            Self::Recommendation => Some(Self::Resolved),
            Self::Resolved => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Understanding => "understanding",
            Self::RiskIdentification => "risk_identification",
            Self::Alternative => "alternative",
            Self::Recommendation => "recommendation",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "understanding" => Some(Self::Understanding),
            "risk_identification" => Some(Self::RiskIdentification),
            "alternative" => Some(Self::Alternative),
            "recommendation" => Some(Self::Recommendation),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

impl fmt::Display for DialogueStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a scheduled task run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded { summary: String },
    Failed { error: String },
    /// Abandoned after the caller-supplied timeout; not retried until the next interval.
    TimedOut,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { summary } => write!(f, "succeeded: {summary}"),
            Self::Failed { error } => write!(f, "failed: {error}"),
            Self::TimedOut => write!(f, "failed(timeout)"),
        }
    }
}
