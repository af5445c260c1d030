//! The transaction-log interface to the persistent store.
//!
//! The core never owns the storage engine. Everything it persists flows
//! through [`Journal::append`] as a [`JournalRecord`], one variant per
//! logical table.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{DialogueStage, NeedsTier, Outcome, RequestId, SessionId, TaskOutcome};

/// Row of `actions`: one per policy verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub request_id: RequestId,
    pub description: String,
    pub urgent: bool,
    pub outcome: Outcome,
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
}

/// Row of `transactions`. The balance is the running fold of `amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Signed: spend is negative, credit is positive.
    pub amount: f64,
    pub balance_after: f64,
    pub request_id: Option<RequestId>,
    #[serde(default)]
    pub memo: String,
}

/// Row of `dialogue_log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurnRecord {
    pub session_id: SessionId,
    pub stage: DialogueStage,
    pub turn_text: String,
    pub timestamp: DateTime<Utc>,
}

/// Row of `hierarchy_of_needs`. `exited_at` is `None` for the current tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRecord {
    pub tier: NeedsTier,
    pub entered_at: DateTime<Utc>,
    pub exited_at: Option<DateTime<Utc>>,
}

/// Row of `tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub interval_seconds: u64,
    pub required_tier: NeedsTier,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Row of `task_runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRunRecord {
    pub task_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: TaskOutcome,
}

/// Everything the core writes to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum JournalRecord {
    Action(ActionRecord),
    Transaction(Transaction),
    Dialogue(DialogueTurnRecord),
    /// Closes the open row for `from` (if any) and opens one for `to`.
    TierTransition {
        from: Option<NeedsTier>,
        to: NeedsTier,
        at: DateTime<Utc>,
    },
    /// Upserts the task definition by name.
    Task(TaskRecord),
    TaskRun(TaskRunRecord),
}

impl JournalRecord {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Action(_) => "actions",
            Self::Transaction(_) => "transactions",
            Self::Dialogue(_) => "dialogue_log",
            Self::TierTransition { .. } => "hierarchy_of_needs",
            Self::Task(_) => "tasks",
            Self::TaskRun(_) => "task_runs",
        }
    }
}

/// Append-only transaction log consumed by the core.
///
/// Read methods return the newest rows last, capped at `limit`.
pub trait Journal: Send + Sync {
    /// Durably append one record. A returned error means nothing was written.
    fn append(&self, record: JournalRecord) -> Result<()>;

    fn actions(&self, limit: usize) -> Result<Vec<ActionRecord>>;

    fn transactions(&self, limit: usize) -> Result<Vec<Transaction>>;

    /// Dialogue turns, optionally restricted to one session.
    fn dialogue(&self, session_id: Option<SessionId>, limit: usize) -> Result<Vec<DialogueTurnRecord>>;

    fn tier_history(&self, limit: usize) -> Result<Vec<TierRecord>>;

    fn tasks(&self) -> Result<Vec<TaskRecord>>;

    fn task_runs(&self, limit: usize) -> Result<Vec<TaskRunRecord>>;

    /// Balance after the most recent transaction, if there is one.
    fn last_balance(&self) -> Result<Option<f64>> {
        Ok(self.transactions(1)?.last().map(|t| t.balance_after))
    }
}

fn tail<T: Clone>(rows: &[T], limit: usize) -> Vec<T> {
    rows[rows.len().saturating_sub(limit)..].to_vec()
}

#[derive(Default)]
struct MemoryTables {
    actions: Vec<ActionRecord>,
    transactions: Vec<Transaction>,
    dialogue: Vec<DialogueTurnRecord>,
    tiers: Vec<TierRecord>,
    tasks: Vec<TaskRecord>,
    task_runs: Vec<TaskRunRecord>,
}

/// In-process journal used by tests and by `--ephemeral` runs.
#[derive(Default)]
pub struct MemoryJournal {
    tables: Mutex<MemoryTables>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rows across all tables.
    pub fn len(&self) -> usize {
        let t = self.tables.lock();
        t.actions.len()
            + t.transactions.len()
            + t.dialogue.len()
            + t.tiers.len()
            + t.tasks.len()
            + t.task_runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transactions recorded against one request.
    pub fn transactions_for(&self, request_id: RequestId) -> Vec<Transaction> {
        self.tables
            .lock()
            .transactions
            .iter()
            .filter(|t| t.request_id == Some(request_id))
            .cloned()
            .collect()
    }
}

impl Journal for MemoryJournal {
    fn append(&self, record: JournalRecord) -> Result<()> {
        let mut t = self.tables.lock();
        match record {
            JournalRecord::Action(r) => t.actions.push(r),
            JournalRecord::Transaction(r) => t.transactions.push(r),
            JournalRecord::Dialogue(r) => t.dialogue.push(r),
            JournalRecord::TierTransition { from, to, at } => {
                if let Some(from) = from
                    && let Some(open) = t
                        .tiers
                        .iter_mut()
                        .rev()
                        .find(|r| r.tier == from && r.exited_at.is_none())
                {
                    open.exited_at = Some(at);
                }
                t.tiers.push(TierRecord {
                    tier: to,
                    entered_at: at,
                    exited_at: None,
                });
            }
            JournalRecord::Task(r) => {
                if let Some(existing) = t.tasks.iter_mut().find(|x| x.name == r.name) {
                    *existing = r;
                } else {
                    t.tasks.push(r);
                }
            }
            JournalRecord::TaskRun(r) => t.task_runs.push(r),
        }
        Ok(())
    }

    fn actions(&self, limit: usize) -> Result<Vec<ActionRecord>> {
        Ok(tail(&self.tables.lock().actions, limit))
    }

    fn transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        Ok(tail(&self.tables.lock().transactions, limit))
    }

    fn dialogue(&self, session_id: Option<SessionId>, limit: usize) -> Result<Vec<DialogueTurnRecord>> {
        let t = self.tables.lock();
        let rows: Vec<_> = t
            .dialogue
            .iter()
            .filter(|r| session_id.is_none_or(|s| r.session_id == s))
            .cloned()
            .collect();
        Ok(tail(&rows, limit))
    }

    fn tier_history(&self, limit: usize) -> Result<Vec<TierRecord>> {
        Ok(tail(&self.tables.lock().tiers, limit))
    }

    fn tasks(&self) -> Result<Vec<TaskRecord>> {
        Ok(self.tables.lock().tasks.clone())
    }

    fn task_runs(&self, limit: usize) -> Result<Vec<TaskRunRecord>> {
        Ok(tail(&self.tables.lock().task_runs, limit))
    }
}
