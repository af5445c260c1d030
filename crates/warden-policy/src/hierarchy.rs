use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use warden_config::HierarchyConfig;
use warden_core::{Journal, JournalRecord, NeedsTier};

/// One observation of the agent's condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    /// 1.0 = idle host, 0.0 = a resource limit has been reached.
    pub resource_health: f64,
    pub balance: f64,
    /// Net balance change over the recent transaction window.
    pub balance_trend: f64,
    /// Failed fraction of recent task runs.
    pub error_rate: f64,
    /// Flagged or blocked requests not yet resolved.
    pub unresolved_flags: usize,
    pub observed_at: DateTime<Utc>,
}

/// Stability thresholds for each tier.
#[derive(Debug, Clone)]
pub struct Thresholds {
    pub min_balance: f64,
    pub min_resource_health: f64,
    pub max_error_rate: f64,
    pub max_flag_backlog: usize,
    pub promotion_window: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&HierarchyConfig::default())
    }
}

impl From<&HierarchyConfig> for Thresholds {
    fn from(cfg: &HierarchyConfig) -> Self {
        Self {
            min_balance: cfg.min_balance,
            min_resource_health: cfg.min_resource_health,
            max_error_rate: cfg.max_error_rate,
            max_flag_backlog: cfg.max_flag_backlog,
            promotion_window: Duration::from_secs(cfg.promotion_window_secs),
        }
    }
}

impl Thresholds {
    /// Whether `tier`'s own needs are currently met.
    pub fn stable(&self, tier: NeedsTier, s: &Signals) -> bool {
        match tier {
            NeedsTier::Physiological => {
                s.balance >= self.min_balance && s.resource_health >= self.min_resource_health
            }
            NeedsTier::Growth => s.error_rate <= self.max_error_rate,
            NeedsTier::Cognitive => s.unresolved_flags <= self.max_flag_backlog,
            NeedsTier::SelfActualization => s.balance_trend >= 0.0,
        }
    }

    /// Whether `tier` may be entered from below.
    pub fn entry(&self, tier: NeedsTier, s: &Signals) -> bool {
        match tier {
            NeedsTier::Growth => self.stable(tier, s) && s.balance_trend >= 0.0,
            _ => self.stable(tier, s),
        }
    }
}

/// Result of one `reevaluate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierEvaluation {
    pub previous: NeedsTier,
    pub current: NeedsTier,
}

impl TierEvaluation {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }

    pub fn promoted(&self) -> bool {
        self.current > self.previous
    }

    pub fn demoted(&self) -> bool {
        self.current < self.previous
    }
}

struct HierarchyState {
    current: NeedsTier,
    /// Start of the current uninterrupted stretch in which `current` is stable.
    stable_since: Option<DateTime<Utc>>,
    last_observed: Option<DateTime<Utc>>,
}

/// Tracks the current needs tier and moves it between tiers.
pub struct HierarchyManager {
    thresholds: Thresholds,
    state: Mutex<HierarchyState>,
    journal: Arc<dyn Journal>,
}

impl HierarchyManager {
    /// Resume from the journal's open tier row, or start at Physiological.
    pub fn new(thresholds: Thresholds, journal: Arc<dyn Journal>) -> warden_core::Result<Self> {
        let restored = journal
            .tier_history(1)?
            .into_iter()
            .last()
            .filter(|r| r.exited_at.is_none())
            .map(|r| r.tier);

        let current = match restored {
            Some(tier) => {
                info!(tier = %tier, "restored needs tier");
                tier
            }
            None => {
                journal.append(JournalRecord::TierTransition {
                    from: None,
                    to: NeedsTier::Physiological,
                    at: Utc::now(),
                })?;
                NeedsTier::Physiological
            }
        };

        Ok(Self {
            thresholds,
            state: Mutex::new(HierarchyState {
                current,
                stable_since: None,
                last_observed: None,
            }),
            journal,
        })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn current_tier(&self) -> NeedsTier {
        self.state.lock().current
    }

    /// Re-evaluate the tier against one observation.
    ///
    /// Observations at or before the last one seen are ignored, so repeating a
    /// call with the same signals is a no-op. Promotion moves at most one tier;
    /// demotion falls below the lowest failing tier in one step.
    pub fn reevaluate(&self, signals: &Signals) -> warden_core::Result<TierEvaluation> {
        let mut state = self.state.lock();
        let previous = state.current;
        let unchanged = TierEvaluation {
            previous,
            current: previous,
        };

        if state.last_observed.is_some_and(|last| signals.observed_at <= last) {
            debug!(tier = %previous, "observation already evaluated");
            return Ok(unchanged);
        }

        let failing = NeedsTier::ALL
            .into_iter()
            .filter(|t| *t <= previous)
            .find(|t| !self.thresholds.stable(*t, signals));

        let (next, stable_since) = match failing {
            Some(NeedsTier::Physiological) => (NeedsTier::Physiological, None),
            Some(tier) => {
                let target = tier.prev().unwrap_or(NeedsTier::Physiological);
                (target, Some(signals.observed_at))
            }
            None => {
                let since = state.stable_since.unwrap_or(signals.observed_at);
                let held = (signals.observed_at - since).to_std().unwrap_or_default();
                match previous.next() {
                    Some(up) if held >= self.thresholds.promotion_window && self.thresholds.entry(up, signals) => {
                        (up, Some(signals.observed_at))
                    }
                    _ => (previous, Some(since)),
                }
            }
        };

        if next != previous {
            self.journal.append(JournalRecord::TierTransition {
                from: Some(previous),
                to: next,
                at: signals.observed_at,
            })?;
            if next < previous {
                warn!(from = %previous, to = %next, "needs tier demoted");
            } else {
                info!(from = %previous, to = %next, "needs tier promoted");
            }
        }

        state.current = next;
        state.stable_since = stable_since;
        state.last_observed = Some(signals.observed_at);

        Ok(TierEvaluation {
            previous,
            current: next,
        })
    }
}
