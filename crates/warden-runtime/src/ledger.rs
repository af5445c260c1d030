//! The economic ledger: a running balance folded over the `transactions` table.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use warden_config::LedgerConfig;
use warden_core::{Journal, JournalRecord, RequestId, Transaction, WardenError};
use warden_router::BudgetState;

const OPENING_MEMO: &str = "opening balance";

struct LedgerState {
    balance: f64,
    charged: HashSet<RequestId>,
}

/// Records spend and credits. Every balance change is journaled before it is
/// applied, inside the same lock, so the in-memory balance never runs ahead of
/// the log.
pub struct Ledger {
    state: Mutex<LedgerState>,
    journal: Arc<dyn Journal>,
    floor: f64,
    trend_window: usize,
}

impl Ledger {
    /// Restore the balance from the journal, or record the opening balance.
    pub fn open(cfg: &LedgerConfig, journal: Arc<dyn Journal>) -> warden_core::Result<Self> {
        let balance = match journal.last_balance()? {
            Some(balance) => {
                info!(balance, "restored ledger balance");
                balance
            }
            None => {
                journal.append(JournalRecord::Transaction(Transaction {
                    id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    amount: cfg.starting_balance,
                    balance_after: cfg.starting_balance,
                    request_id: None,
                    memo: OPENING_MEMO.into(),
                }))?;
                info!(balance = cfg.starting_balance, "ledger opened");
                cfg.starting_balance
            }
        };

        let charged = journal
            .transactions(i64::MAX as usize)?
            .into_iter()
            .filter_map(|t| t.request_id)
            .collect();

        Ok(Self {
            state: Mutex::new(LedgerState { balance, charged }),
            journal,
            floor: cfg.budget_floor,
            trend_window: cfg.trend_window,
        })
    }

    pub fn balance(&self) -> f64 {
        self.state.lock().balance
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// Snapshot handed to the cost router.
    pub fn budget(&self) -> BudgetState {
        BudgetState {
            balance: self.balance(),
            floor: self.floor,
        }
    }

    /// Debit `amount` against `request_id`. A request is charged at most once.
    pub fn charge(&self, request_id: RequestId, amount: f64, memo: &str) -> warden_core::Result<Transaction> {
        if amount < 0.0 || !amount.is_finite() {
            return Err(WardenError::Other(anyhow::anyhow!(
                "charge for request {request_id} must be a non-negative amount, got {amount}"
            )));
        }
        let mut state = self.state.lock();
        if state.charged.contains(&request_id) {
            warn!(request_id = %request_id, "request already charged");
            return Err(WardenError::DuplicateTransaction(request_id));
        }

        let tx = Transaction {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            amount: 0.0 - amount,
            balance_after: state.balance - amount,
            request_id: Some(request_id),
            memo: memo.to_string(),
        };
        self.journal.append(JournalRecord::Transaction(tx.clone()))?;
        state.balance = tx.balance_after;
        state.charged.insert(request_id);

        if state.balance < self.floor {
            warn!(balance = state.balance, floor = self.floor, "balance below floor");
        }
        info!(request_id = %request_id, amount, balance = state.balance, "ledger charged");
        Ok(tx)
    }

    /// Operator deposit.
    pub fn credit(&self, amount: f64, memo: &str) -> warden_core::Result<Transaction> {
        if amount <= 0.0 || !amount.is_finite() {
            return Err(WardenError::Other(anyhow::anyhow!(
                "credit must be a positive amount, got {amount}"
            )));
        }
        let mut state = self.state.lock();
        let tx = Transaction {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            amount,
            balance_after: state.balance + amount,
            request_id: None,
            memo: memo.to_string(),
        };
        self.journal.append(JournalRecord::Transaction(tx.clone()))?;
        state.balance = tx.balance_after;
        info!(amount, balance = state.balance, "ledger credited");
        Ok(tx)
    }

    /// Net balance change over the last `trend_window` transactions. The
    /// opening balance is a starting point, not a change, and never counts.
    pub fn trend(&self) -> warden_core::Result<f64> {
        let recent = self.journal.transactions(self.trend_window.saturating_add(1))?;
        Ok(recent
            .iter()
            .rev()
            .filter(|t| !is_opening(t))
            .take(self.trend_window)
            .map(|t| t.amount)
            .sum())
    }

    /// Recent transactions, oldest first.
    pub fn history(&self, limit: usize) -> warden_core::Result<Vec<Transaction>> {
        self.journal.transactions(limit)
    }
}

fn is_opening(t: &Transaction) -> bool {
    t.request_id.is_none() && t.memo == OPENING_MEMO
}
