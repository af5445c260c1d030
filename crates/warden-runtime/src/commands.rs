//! Operator command surface shared by the one-shot CLI and the interactive console.

use chrono::{DateTime, Utc};
use serde::Serialize;
use warden_core::{
    ActionRecord, NeedsTier, RequestId, SessionId, TaskRunRecord, TierRecord, Transaction,
};
use warden_policy::OperatorInput;
use warden_router::{BackendProfile, BackendStats};

use crate::backlog::PendingRequest;
use crate::governor::Submission;
use crate::maintenance::{BalanceStatus, ResourceSample};
use crate::scheduler::TaskStatus;

/// One parsed operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Status,
    /// Recent policy verdicts.
    Log { limit: usize },
    Economics { limit: usize },
    Hierarchy { limit: usize },
    Tasks,
    /// Requests waiting on the operator.
    Unresolved,
    Submit { description: String, urgent: bool },
    /// Dialogue input. Without a session id the console's active session is used.
    Respond {
        session_id: Option<SessionId>,
        input: OperatorInput,
    },
    AcknowledgeRisk { request_id: RequestId },
    /// Withdraw an aborted or locked-out request.
    Dismiss { request_id: RequestId },
    Credit { amount: f64, memo: String },
    /// Admin availability update for a backend.
    Backend { id: String, available: bool },
    Backends,
}

impl OperatorCommand {
    /// Parse a console line. Bare dialogue inputs (`ack`, `accept`, `override`,
    /// `cancel`, `correct <text>`) become `Respond` for the active session.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((h, r)) => (h, r.trim()),
            None => (line, ""),
        };

        match head.to_ascii_lowercase().as_str() {
            "" => Err("empty command".into()),
            "status" => Ok(Self::Status),
            "log" => Ok(Self::Log {
                limit: parse_limit(rest, 20)?,
            }),
            "economics" => Ok(Self::Economics {
                limit: parse_limit(rest, 10)?,
            }),
            "hierarchy" => Ok(Self::Hierarchy {
                limit: parse_limit(rest, 10)?,
            }),
            "tasks" => Ok(Self::Tasks),
            "unresolved" | "backlog" => Ok(Self::Unresolved),
            "submit" | "urgent" => {
                let (urgent, description) = match rest.strip_prefix("--urgent") {
                    Some(d) => (true, d.trim()),
                    None => (head.eq_ignore_ascii_case("urgent"), rest),
                };
                if description.is_empty() {
                    return Err("usage: submit [--urgent] <description>".into());
                }
                Ok(Self::Submit {
                    description: description.to_string(),
                    urgent,
                })
            }
            "respond" => {
                let (session_id, input) = match rest.split_once(char::is_whitespace) {
                    Some((id, input)) if uuid::Uuid::parse_str(id).is_ok() => {
                        (uuid::Uuid::parse_str(id).ok(), input)
                    }
                    _ => (None, rest),
                };
                let input = OperatorInput::parse(input)
                    .ok_or_else(|| format!("not a dialogue input: '{input}'"))?;
                Ok(Self::Respond { session_id, input })
            }
            "acknowledge-risk" | "ack-risk" => {
                let request_id = uuid::Uuid::parse_str(rest)
                    .map_err(|e| format!("usage: acknowledge-risk <request-id> ({e})"))?;
                Ok(Self::AcknowledgeRisk { request_id })
            }
            "dismiss" | "withdraw" => {
                let request_id = uuid::Uuid::parse_str(rest)
                    .map_err(|e| format!("usage: dismiss <request-id> ({e})"))?;
                Ok(Self::Dismiss { request_id })
            }
            "credit" => {
                let (amount, memo) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let amount = amount
                    .parse::<f64>()
                    .map_err(|_| "usage: credit <amount> [memo]".to_string())?;
                Ok(Self::Credit {
                    amount,
                    memo: if memo.trim().is_empty() {
                        "operator credit".into()
                    } else {
                        memo.trim().to_string()
                    },
                })
            }
            "backend" => {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(id), Some("up" | "on" | "available")) => Ok(Self::Backend {
                        id: id.to_string(),
                        available: true,
                    }),
                    (Some(id), Some("down" | "off" | "unavailable")) => Ok(Self::Backend {
                        id: id.to_string(),
                        available: false,
                    }),
                    (None, None) => Ok(Self::Backends),
                    _ => Err("usage: backend [<id> up|down]".into()),
                }
            }
            "backends" => Ok(Self::Backends),
            _ => match OperatorInput::parse(line) {
                Some(input) => Ok(Self::Respond {
                    session_id: None,
                    input,
                }),
                None => Err(format!("unknown command '{head}'")),
            },
        }
    }
}

fn parse_limit(s: &str, default: usize) -> Result<usize, String> {
    if s.is_empty() {
        Ok(default)
    } else {
        s.parse().map_err(|_| format!("invalid count '{s}'"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub tier: NeedsTier,
    pub balance: f64,
    pub floor: f64,
    pub balance_status: BalanceStatus,
    pub resource_health: f64,
    pub last_sample: Option<ResourceSample>,
    pub error_rate: f64,
    pub unresolved: usize,
    pub open_sessions: usize,
    pub tasks_running: usize,
    /// `None` for stores without a hash chain.
    pub audit_chain_intact: Option<bool>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EconomicsReport {
    pub balance: f64,
    pub floor: f64,
    pub trend: f64,
    pub balance_status: BalanceStatus,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HierarchyReport {
    pub current: NeedsTier,
    pub history: Vec<TierRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TasksReport {
    pub tasks: Vec<TaskStatus>,
    pub recent_runs: Vec<TaskRunRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendReport {
    pub profile: BackendProfile,
    pub stats: BackendStats,
}

/// What a command produced.
#[derive(Debug, Clone)]
pub enum CommandOutput {
    Status(StatusReport),
    Log(Vec<ActionRecord>),
    Economics(EconomicsReport),
    Hierarchy(HierarchyReport),
    Tasks(TasksReport),
    Unresolved(Vec<PendingRequest>),
    Submission(Submission),
    Transaction(Transaction),
    Dismissed(PendingRequest),
    Backends(Vec<BackendReport>),
}
