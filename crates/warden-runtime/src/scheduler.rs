//! # Needs-tier task scheduler
//!
//! Runs recurring maintenance tasks at fixed intervals. Each task is tagged
//! with the needs tier it requires; a due task is only admitted while the
//! current tier is at or above that tag.
//!
//! Admission happens under one lock: a task that is due, permitted, and not
//! already running is marked running and its `last_run_at` is stamped and
//! persisted before the run starts. Runs execute concurrently on a
//! [`JoinSet`]; each carries a timeout after which it is abandoned and
//! recorded as `TimedOut`. Every finished run is appended to `task_runs` and
//! triggers a hierarchy re-evaluation.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warden_config::{HierarchyConfig, SchedulerConfig};
use warden_core::{
    Journal, JournalRecord, NeedsTier, TaskOutcome, TaskRecord, TaskRunRecord, WardenError,
};
use warden_policy::HierarchyManager;

use crate::maintenance::{MaintenanceTask, Vitals, builtin_task};

/// A registered recurring task.
struct ScheduledTask {
    interval: chrono::Duration,
    required_tier: NeedsTier,
    last_run: Option<DateTime<Utc>>,
    task: Arc<dyn MaintenanceTask>,
}

impl ScheduledTask {
    fn due(&self, now: DateTime<Utc>) -> bool {
        self.last_run.is_none_or(|last| now - last >= self.interval)
    }

    fn record(&self, name: &str) -> TaskRecord {
        TaskRecord {
            name: name.to_string(),
            interval_seconds: self.interval.num_seconds().max(0) as u64,
            required_tier: self.required_tier,
            last_run_at: self.last_run,
        }
    }
}

/// Operator view of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatus {
    pub name: String,
    pub interval_secs: u64,
    pub required_tier: NeedsTier,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_due_at: Option<DateTime<Utc>>,
    pub running: bool,
    /// Whether the current tier permits the task.
    pub permitted: bool,
}

/// Runs launched but not yet settled.
#[derive(Default)]
struct InFlight {
    runs: JoinSet<TaskRunRecord>,
    names: HashMap<Id, (String, DateTime<Utc>)>,
}

/// The needs-tier scheduler.
pub struct TaskScheduler {
    tasks: Mutex<BTreeMap<String, ScheduledTask>>,
    running: Mutex<HashSet<String>>,
    journal: Arc<dyn Journal>,
    hierarchy: Arc<HierarchyManager>,
    vitals: Vitals,
    tick: Duration,
    timeout: Duration,
}

impl TaskScheduler {
    pub fn new(
        journal: Arc<dyn Journal>,
        hierarchy: Arc<HierarchyManager>,
        vitals: Vitals,
        tick: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            tasks: Mutex::new(BTreeMap::new()),
            running: Mutex::new(HashSet::new()),
            journal,
            hierarchy,
            vitals,
            tick,
            timeout,
        }
    }

    /// Build a scheduler with the enabled built-in tasks named in `cfg`.
    pub fn from_config(
        cfg: &SchedulerConfig,
        hierarchy_cfg: &HierarchyConfig,
        journal: Arc<dyn Journal>,
        hierarchy: Arc<HierarchyManager>,
        vitals: Vitals,
    ) -> warden_core::Result<Self> {
        let scheduler = Self::new(
            journal,
            hierarchy,
            vitals,
            Duration::from_secs(cfg.tick_secs),
            Duration::from_secs(cfg.task_timeout_secs),
        );
        for t in cfg.tasks.iter().filter(|t| t.enabled) {
            let task = builtin_task(&t.name, hierarchy_cfg)
                .ok_or_else(|| WardenError::UnknownTask(t.name.clone()))?;
            scheduler.register(task, Duration::from_secs(t.interval_secs), t.required_tier)?;
        }
        Ok(scheduler)
    }

    /// Register a task. A previously persisted `last_run_at` is restored so a
    /// restart does not re-run everything at once.
    pub fn register(
        &self,
        task: Arc<dyn MaintenanceTask>,
        interval: Duration,
        required_tier: NeedsTier,
    ) -> warden_core::Result<()> {
        let name = task.name().to_string();
        let interval = chrono::Duration::from_std(interval)
            .map_err(|e| WardenError::ConfigValidation {
                field: format!("scheduler.tasks.{name}.interval_secs"),
                reason: e.to_string(),
            })?;
        let last_run = self
            .journal
            .tasks()?
            .into_iter()
            .find(|r| r.name == name)
            .and_then(|r| r.last_run_at);

        let scheduled = ScheduledTask {
            interval,
            required_tier,
            last_run,
            task,
        };
        self.journal.append(JournalRecord::Task(scheduled.record(&name)))?;
        info!(task = %name, tier = %required_tier, interval_secs = interval.num_seconds(), "registered task");
        self.tasks.lock().insert(name, scheduled);
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick
    }

    /// Admit every task that is due, permitted at `tier`, and not running.
    /// Returns the admitted names; each is now marked running.
    ///
    /// All or nothing: if a stamp cannot be persisted, every mark made in this
    /// pass is undone and the error returned, so no task is left running
    /// without a launch.
    pub fn admit(&self, now: DateTime<Utc>, tier: NeedsTier) -> warden_core::Result<Vec<String>> {
        let mut tasks = self.tasks.lock();
        let mut running = self.running.lock();
        let mut admitted: Vec<(String, Option<DateTime<Utc>>)> = Vec::new();
        let mut failure = None;

        for (name, task) in tasks.iter_mut() {
            if running.contains(name) {
                continue;
            }
            if task.required_tier > tier {
                if task.due(now) {
                    debug!(task = %name, required = %task.required_tier, current = %tier, "task held by needs tier");
                }
                continue;
            }
            if !task.due(now) {
                continue;
            }

            let previous = task.last_run.replace(now);
            if let Err(e) = self.journal.append(JournalRecord::Task(task.record(name))) {
                task.last_run = previous;
                error!(task = %name, error = %e, "failed to persist task admission");
                failure = Some(e);
                break;
            }
            running.insert(name.clone());
            admitted.push((name.clone(), previous));
        }

        let Some(e) = failure else {
            return Ok(admitted.into_iter().map(|(name, _)| name).collect());
        };
        for (name, previous) in admitted {
            running.remove(&name);
            if let Some(task) = tasks.get_mut(&name) {
                task.last_run = previous;
                if let Err(e) = self.journal.append(JournalRecord::Task(task.record(&name))) {
                    warn!(task = %name, error = %e, "failed to restore task stamp");
                }
            }
        }
        Err(e)
    }

    /// Admit and run every due task, waiting for all of them to finish.
    pub async fn tick(&self) -> warden_core::Result<Vec<TaskRunRecord>> {
        let mut flight = InFlight::default();
        self.launch(&mut flight, Utc::now())?;

        let mut finished = Vec::new();
        while let Some(joined) = flight.runs.join_next_with_id().await {
            if let Some(record) = self.settle(&mut flight, joined)? {
                finished.push(record);
            }
        }
        Ok(finished)
    }

    /// The scheduler loop. Ticks every `tick_secs` until `cancel` fires; runs
    /// still in flight at that point are abandoned.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut flight = InFlight::default();
        info!(tick_secs = self.tick.as_secs(), tasks = self.tasks.lock().len(), "scheduler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.launch(&mut flight, Utc::now()) {
                        error!(error = %e, "scheduler tick failed");
                    }
                }
                Some(joined) = flight.runs.join_next_with_id(), if !flight.runs.is_empty() => {
                    if let Err(e) = self.settle(&mut flight, joined) {
                        error!(error = %e, "failed to record task run");
                    }
                }
            }
        }

        if !flight.runs.is_empty() {
            warn!(abandoned = flight.runs.len(), "scheduler stopping with runs in flight");
        }
        flight.runs.shutdown().await;
        for (name, _) in flight.names.into_values() {
            self.release(&name);
        }
        info!("scheduler stopped");
    }

    pub fn statuses(&self) -> Vec<TaskStatus> {
        let tier = self.hierarchy.current_tier();
        let running = self.running.lock();
        self.tasks
            .lock()
            .iter()
            .map(|(name, t)| TaskStatus {
                name: name.clone(),
                interval_secs: t.interval.num_seconds().max(0) as u64,
                required_tier: t.required_tier,
                last_run_at: t.last_run,
                next_due_at: t.last_run.map(|last| last + t.interval),
                running: running.contains(name),
                permitted: t.required_tier <= tier,
            })
            .collect()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running.lock().contains(name)
    }

    fn launch(&self, flight: &mut InFlight, now: DateTime<Utc>) -> warden_core::Result<usize> {
        let tier = self.hierarchy.current_tier();
        let admitted = self.admit(now, tier)?;
        let count = admitted.len();

        for name in admitted {
            let Some(task) = self.tasks.lock().get(&name).map(|t| t.task.clone()) else {
                self.release(&name);
                continue;
            };
            let vitals = self.vitals.clone();
            let timeout = self.timeout;
            let started_at = Utc::now();
            info!(task = %name, tier = %tier, "task admitted");
            let handle = flight
                .runs
                .spawn(execute(name.clone(), task, vitals, timeout, started_at));
            flight.names.insert(handle.id(), (name, started_at));
        }
        Ok(count)
    }

    /// Record a finished run. Cancelled runs are released without a record.
    fn settle(
        &self,
        flight: &mut InFlight,
        joined: Result<(Id, TaskRunRecord), JoinError>,
    ) -> warden_core::Result<Option<TaskRunRecord>> {
        let record = match joined {
            Ok((id, record)) => {
                flight.names.remove(&id);
                record
            }
            Err(e) => {
                let Some((name, started_at)) = flight.names.remove(&e.id()) else {
                    return Ok(None);
                };
                if e.is_cancelled() {
                    self.release(&name);
                    warn!(task = %name, "task run abandoned");
                    return Ok(None);
                }
                TaskRunRecord {
                    task_name: name,
                    started_at,
                    ended_at: Utc::now(),
                    outcome: TaskOutcome::Failed {
                        error: format!("task panicked: {e}"),
                    },
                }
            }
        };
        self.complete(record.clone())?;
        Ok(Some(record))
    }

    fn complete(&self, record: TaskRunRecord) -> warden_core::Result<()> {
        self.release(&record.task_name);
        match &record.outcome {
            TaskOutcome::Succeeded { summary } => {
                info!(task = %record.task_name, summary = %summary, "task succeeded")
            }
            other => warn!(task = %record.task_name, outcome = %other, "task did not succeed"),
        }
        self.journal.append(JournalRecord::TaskRun(record))?;

        let signals = self.vitals.signals()?;
        self.hierarchy.reevaluate(&signals)?;
        Ok(())
    }

    fn release(&self, name: &str) {
        self.running.lock().remove(name);
    }
}

async fn execute(
    name: String,
    task: Arc<dyn MaintenanceTask>,
    vitals: Vitals,
    timeout: Duration,
    started_at: DateTime<Utc>,
) -> TaskRunRecord {
    let outcome = match tokio::time::timeout(timeout, task.run(&vitals)).await {
        Ok(Ok(summary)) => TaskOutcome::Succeeded { summary },
        Ok(Err(e)) => TaskOutcome::Failed {
            error: e.to_string(),
        },
        Err(_) => TaskOutcome::TimedOut,
    };
    TaskRunRecord {
        task_name: name,
        started_at,
        ended_at: Utc::now(),
        outcome,
    }
}
