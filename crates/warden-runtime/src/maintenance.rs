//! Background maintenance: the host health gauge, the signal snapshot fed to
//! the needs hierarchy, and the built-in maintenance tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use sysinfo::{Disks, System};
use tracing::{debug, warn};
use warden_config::HierarchyConfig;
use warden_core::{Journal, Outcome, WardenError};
use warden_policy::Signals;

use crate::backlog::{PendingReason, RiskBacklog};
use crate::ledger::Ledger;

/// Task runs considered when computing the error rate.
const ERROR_RATE_WINDOW: usize = 20;

// ── Health gauge ───────────────────────────────────────────────

/// One reading of host memory and disk usage, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceSample {
    pub memory_pct: f64,
    pub disk_pct: f64,
    pub sampled_at: DateTime<Utc>,
}

impl ResourceSample {
    pub fn new(memory_pct: f64, disk_pct: f64) -> Self {
        Self {
            memory_pct,
            disk_pct,
            sampled_at: Utc::now(),
        }
    }
}

/// Converts host resource usage into a 0.0–1.0 health fraction.
///
/// Health is the smaller remaining headroom of memory and disk against their
/// limits. Until the first sample the host is assumed healthy.
pub struct HealthGauge {
    max_memory_pct: f64,
    max_disk_pct: f64,
    last: Mutex<Option<ResourceSample>>,
}

impl HealthGauge {
    pub fn new(max_memory_pct: f64, max_disk_pct: f64) -> Self {
        Self {
            max_memory_pct,
            max_disk_pct,
            last: Mutex::new(None),
        }
    }

    pub fn from_config(cfg: &HierarchyConfig) -> Self {
        Self::new(cfg.max_memory_pct, cfg.max_disk_pct)
    }

    /// Read memory and disk usage from the host and keep the reading.
    pub fn sample(&self) -> ResourceSample {
        let mut sys = System::new();
        sys.refresh_memory();
        let memory_pct = percent(sys.used_memory(), sys.total_memory());

        let disks = Disks::new_with_refreshed_list();
        let (total, available) = disks.iter().fold((0u64, 0u64), |(t, a), disk| {
            (t + disk.total_space(), a + disk.available_space())
        });
        let disk_pct = percent(total.saturating_sub(available), total);

        let sample = ResourceSample::new(memory_pct, disk_pct);
        self.record(sample);
        sample
    }

    pub fn record(&self, sample: ResourceSample) {
        debug!(memory_pct = sample.memory_pct, disk_pct = sample.disk_pct, "resource sample recorded");
        *self.last.lock() = Some(sample);
    }

    pub fn last(&self) -> Option<ResourceSample> {
        *self.last.lock()
    }

    pub fn health(&self) -> f64 {
        self.last().map_or(1.0, |s| self.health_of(&s))
    }

    pub fn health_of(&self, sample: &ResourceSample) -> f64 {
        let memory = 1.0 - sample.memory_pct / self.max_memory_pct;
        let disk = 1.0 - sample.disk_pct / self.max_disk_pct;
        memory.min(disk).clamp(0.0, 1.0)
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

// ── Vitals ─────────────────────────────────────────────────────

/// Shared handles to everything the hierarchy signals are computed from.
/// Maintenance tasks receive a clone of this.
#[derive(Clone)]
pub struct Vitals {
    pub journal: Arc<dyn Journal>,
    pub ledger: Arc<Ledger>,
    pub gauge: Arc<HealthGauge>,
    pub backlog: Arc<RiskBacklog>,
}

impl Vitals {
    /// Failed fraction of the most recent task runs; 0.0 with no history.
    pub fn error_rate(&self) -> warden_core::Result<f64> {
        let runs = self.journal.task_runs(ERROR_RATE_WINDOW)?;
        if runs.is_empty() {
            return Ok(0.0);
        }
        let failed = runs.iter().filter(|r| !r.outcome.is_success()).count();
        Ok(failed as f64 / runs.len() as f64)
    }

    pub fn signals(&self) -> warden_core::Result<Signals> {
        Ok(Signals {
            resource_health: self.gauge.health(),
            balance: self.ledger.balance(),
            balance_trend: self.ledger.trend()?,
            error_rate: self.error_rate()?,
            unresolved_flags: self.backlog.len(),
            observed_at: Utc::now(),
        })
    }
}

// ── Tasks ──────────────────────────────────────────────────────

/// A recurring background job. Returns a one-line summary on success.
#[async_trait]
pub trait MaintenanceTask: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, vitals: &Vitals) -> warden_core::Result<String>;
}

/// Build a built-in task by name.
pub fn builtin_task(name: &str, cfg: &HierarchyConfig) -> Option<Arc<dyn MaintenanceTask>> {
    let task: Arc<dyn MaintenanceTask> = match name {
        "system_health_check" => Arc::new(SystemHealthCheck {
            min_health: cfg.min_resource_health,
        }),
        "economic_review" => Arc::new(EconomicReview {
            min_balance: cfg.min_balance,
        }),
        "risk_backlog_review" => Arc::new(RiskBacklogReview),
        "reflection_cycle" => Arc::new(ReflectionCycle),
        "goal_review" => Arc::new(GoalReview),
        _ => return None,
    };
    Some(task)
}

/// Samples memory and disk usage into the health gauge.
pub struct SystemHealthCheck {
    pub min_health: f64,
}

#[async_trait]
impl MaintenanceTask for SystemHealthCheck {
    fn name(&self) -> &str {
        "system_health_check"
    }

    async fn run(&self, vitals: &Vitals) -> warden_core::Result<String> {
        let gauge = vitals.gauge.clone();
        let sample = tokio::task::spawn_blocking(move || gauge.sample())
            .await
            .map_err(|e| WardenError::Other(anyhow::anyhow!("resource sampling failed: {e}")))?;
        let health = vitals.gauge.health_of(&sample);
        if health < self.min_health {
            warn!(
                memory_pct = sample.memory_pct,
                disk_pct = sample.disk_pct,
                health,
                "host resources near their limits"
            );
        }
        Ok(format!(
            "memory {:.1}%, disk {:.1}%, health {:.2}",
            sample.memory_pct, sample.disk_pct, health
        ))
    }
}

/// Classification of the balance used by the economic review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    Critical,
    Warning,
    Healthy,
}

impl BalanceStatus {
    pub fn classify(balance: f64, floor: f64, min_balance: f64) -> Self {
        if balance < floor {
            Self::Critical
        } else if balance < min_balance {
            Self::Warning
        } else {
            Self::Healthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Healthy => "healthy",
        }
    }
}

/// Classifies the balance as critical, warning or healthy.
pub struct EconomicReview {
    pub min_balance: f64,
}

#[async_trait]
impl MaintenanceTask for EconomicReview {
    fn name(&self) -> &str {
        "economic_review"
    }

    async fn run(&self, vitals: &Vitals) -> warden_core::Result<String> {
        let balance = vitals.ledger.balance();
        let status = BalanceStatus::classify(balance, vitals.ledger.floor(), self.min_balance);
        let trend = vitals.ledger.trend()?;
        if status != BalanceStatus::Healthy {
            warn!(balance, status = status.as_str(), "economic review");
        }
        Ok(format!(
            "balance {:.2} ({}), trend {:+.2}",
            balance,
            status.as_str(),
            trend
        ))
    }
}

/// Summarizes requests still waiting on the operator.
pub struct RiskBacklogReview;

#[async_trait]
impl MaintenanceTask for RiskBacklogReview {
    fn name(&self) -> &str {
        "risk_backlog_review"
    }

    async fn run(&self, vitals: &Vitals) -> warden_core::Result<String> {
        let pending = vitals.backlog.list();
        let Some(oldest) = pending.first() else {
            return Ok("no unresolved requests".into());
        };

        let mut by_reason: HashMap<PendingReason, usize> = HashMap::new();
        for p in &pending {
            *by_reason.entry(p.reason).or_default() += 1;
        }
        let parts: Vec<String> = [
            PendingReason::Lockout,
            PendingReason::InDialogue,
            PendingReason::Aborted,
        ]
        .into_iter()
        .filter_map(|r| by_reason.get(&r).map(|n| format!("{n} {r}")))
        .collect();

        let age = (Utc::now() - oldest.since).num_minutes();
        Ok(format!(
            "{} unresolved ({}); oldest {}m: {}",
            pending.len(),
            parts.join(", "),
            age,
            oldest.request.description()
        ))
    }
}

/// Reviews recent verdicts, dialogue and task outcomes.
pub struct ReflectionCycle;

#[async_trait]
impl MaintenanceTask for ReflectionCycle {
    fn name(&self) -> &str {
        "reflection_cycle"
    }

    async fn run(&self, vitals: &Vitals) -> warden_core::Result<String> {
        let actions = vitals.journal.actions(100)?;
        let count = |o: Outcome| actions.iter().filter(|a| a.outcome == o).count();

        let turns = vitals.journal.dialogue(None, 500)?;
        let sessions: HashSet<_> = turns.iter().map(|t| t.session_id).collect();

        let runs = vitals.journal.task_runs(50)?;
        let failed = runs.iter().filter(|r| !r.outcome.is_success()).count();

        Ok(format!(
            "{} actions ({} allow, {} flag, {} block); {} dialogue sessions ({} turns); {}/{} task runs failed",
            actions.len(),
            count(Outcome::Allow),
            count(Outcome::Flag),
            count(Outcome::Block),
            sessions.len(),
            turns.len(),
            failed,
            runs.len()
        ))
    }
}

/// Surfaces the most frequent intents among recent requests.
pub struct GoalReview;

impl GoalReview {
    /// Leading verb of each description, most frequent first.
    pub fn top_intents<'a>(descriptions: impl Iterator<Item = &'a str>, n: usize) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for d in descriptions {
            let verb: String = d
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if !verb.is_empty() {
                *counts.entry(verb).or_default() += 1;
            }
        }
        let mut ranked: Vec<_> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }
}

#[async_trait]
impl MaintenanceTask for GoalReview {
    fn name(&self) -> &str {
        "goal_review"
    }

    async fn run(&self, vitals: &Vitals) -> warden_core::Result<String> {
        let actions = vitals.journal.actions(200)?;
        let top = Self::top_intents(actions.iter().map(|a| a.description.as_str()), 3);
        if top.is_empty() {
            return Ok("no operator intents recorded".into());
        }
        let listed: Vec<String> = top.iter().map(|(verb, n)| format!("{verb} ({n})")).collect();
        Ok(format!("top intents: {}", listed.join(", ")))
    }
}
