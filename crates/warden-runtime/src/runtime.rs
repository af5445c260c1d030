use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warden_config::WardenConfig;
use warden_core::{ActionRequest, BackendClient, Journal, MemoryJournal, SessionId, WardenError};
use warden_policy::{DialogueEngine, HierarchyManager, PolicyGate, Thresholds};
use warden_router::{BackendRegistry, CostRouter, Dispatcher, HttpBackendClient};
use warden_store::SqliteStore;

use crate::backlog::RiskBacklog;
use crate::commands::{
    BackendReport, CommandOutput, EconomicsReport, HierarchyReport, OperatorCommand, StatusReport,
    TasksReport,
};
use crate::governor::{ExecutionHints, Governor};
use crate::ledger::Ledger;
use crate::maintenance::{BalanceStatus, HealthGauge, Vitals};
use crate::scheduler::TaskScheduler;

/// Everything wired together from one `WardenConfig`.
pub struct WardenRuntime {
    config: WardenConfig,
    journal: Arc<dyn Journal>,
    store: Option<SqliteStore>,
    registry: Arc<BackendRegistry>,
    governor: Arc<Governor>,
    scheduler: Arc<TaskScheduler>,
}

impl WardenRuntime {
    /// Open the SQLite store at `store.db_path` and talk to backends over HTTP.
    pub fn open(config: WardenConfig) -> warden_core::Result<Self> {
        let store = SqliteStore::open(&config.store.db_path)?;
        let registry = Arc::new(BackendRegistry::from_config(&config.router.backends)?);
        let client = HttpBackendClient::new(
            registry.clone(),
            Duration::from_secs(config.router.request_timeout_secs),
        )?;
        Self::build(config, Arc::new(store.clone()), Some(store), registry, Arc::new(client))
    }

    /// An in-memory runtime; nothing survives the process.
    pub fn ephemeral(config: WardenConfig, client: Arc<dyn BackendClient>) -> warden_core::Result<Self> {
        Self::with_journal(config, Arc::new(MemoryJournal::new()), client)
    }

    pub fn with_journal(
        config: WardenConfig,
        journal: Arc<dyn Journal>,
        client: Arc<dyn BackendClient>,
    ) -> warden_core::Result<Self> {
        let registry = Arc::new(BackendRegistry::from_config(&config.router.backends)?);
        Self::build(config, journal, None, registry, client)
    }

    fn build(
        config: WardenConfig,
        journal: Arc<dyn Journal>,
        store: Option<SqliteStore>,
        registry: Arc<BackendRegistry>,
        client: Arc<dyn BackendClient>,
    ) -> warden_core::Result<Self> {
        let ledger = Arc::new(Ledger::open(&config.ledger, journal.clone())?);
        let hierarchy = Arc::new(HierarchyManager::new(
            Thresholds::from(&config.hierarchy),
            journal.clone(),
        )?);
        let vitals = Vitals {
            journal: journal.clone(),
            ledger,
            gauge: Arc::new(HealthGauge::from_config(&config.hierarchy)),
            backlog: Arc::new(RiskBacklog::new()),
        };

        let gate = Arc::new(PolicyGate::from_config(&config.gate, journal.clone()));
        let router = CostRouter::new(registry.clone())
            .gate_on_marginal_value(config.router.gate_on_marginal_value);
        let governor = Arc::new(Governor::new(
            gate,
            DialogueEngine::new(journal.clone()),
            Dispatcher::new(router, client),
            hierarchy.clone(),
            vitals.clone(),
            ExecutionHints::from(&config.router),
        ));
        let scheduler = Arc::new(TaskScheduler::from_config(
            &config.scheduler,
            &config.hierarchy,
            journal.clone(),
            hierarchy,
            vitals,
        )?);

        info!(
            tier = %governor.hierarchy().current_tier(),
            balance = governor.ledger().balance(),
            rules = governor.gate().rule_names().len(),
            backends = registry.profiles().len(),
            "warden runtime ready"
        );
        Ok(Self {
            config,
            journal,
            store,
            registry,
            governor,
            scheduler,
        })
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn journal(&self) -> &Arc<dyn Journal> {
        &self.journal
    }

    pub fn governor(&self) -> &Arc<Governor> {
        &self.governor
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Run the scheduler loop in the background until `cancel` fires.
    pub fn spawn_scheduler(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    }

    /// Execute one operator command. `active_session` is used for dialogue
    /// inputs that do not name a session.
    pub async fn execute(
        &self,
        command: OperatorCommand,
        active_session: Option<SessionId>,
    ) -> warden_core::Result<CommandOutput> {
        let gov = &self.governor;
        Ok(match command {
            OperatorCommand::Status => CommandOutput::Status(self.status()?),
            OperatorCommand::Log { limit } => CommandOutput::Log(self.journal.actions(limit)?),
            OperatorCommand::Economics { limit } => CommandOutput::Economics(self.economics(limit)?),
            OperatorCommand::Hierarchy { limit } => CommandOutput::Hierarchy(HierarchyReport {
                current: gov.hierarchy().current_tier(),
                history: self.journal.tier_history(limit)?,
            }),
            OperatorCommand::Tasks => CommandOutput::Tasks(TasksReport {
                tasks: self.scheduler.statuses(),
                recent_runs: self.journal.task_runs(10)?,
            }),
            OperatorCommand::Unresolved => CommandOutput::Unresolved(gov.unresolved()),
            OperatorCommand::Submit { description, urgent } => {
                let mut request = ActionRequest::operator(description);
                if urgent {
                    request = request.urgent();
                }
                CommandOutput::Submission(gov.submit(request).await?)
            }
            OperatorCommand::Respond { session_id, input } => {
                let session_id = session_id.or(active_session).ok_or_else(|| {
                    WardenError::Other(anyhow::anyhow!("no dialogue session is open"))
                })?;
                CommandOutput::Submission(gov.respond(session_id, input).await?)
            }
            OperatorCommand::AcknowledgeRisk { request_id } => {
                CommandOutput::Submission(gov.acknowledge_risk(request_id).await?)
            }
            OperatorCommand::Dismiss { request_id } => CommandOutput::Dismissed(gov.dismiss(request_id)?),
            OperatorCommand::Credit { amount, memo } => CommandOutput::Transaction(gov.credit(amount, &memo)?),
            OperatorCommand::Backend { id, available } => {
                self.registry.set_availability(&id, available)?;
                warn!(backend = %id, available, "backend availability changed by operator");
                CommandOutput::Backends(self.backends())
            }
            OperatorCommand::Backends => CommandOutput::Backends(self.backends()),
        })
    }

    pub fn status(&self) -> warden_core::Result<StatusReport> {
        let gov = &self.governor;
        let ledger = gov.ledger();
        let gauge = &self.vitals().gauge;
        let audit_chain_intact = match &self.store {
            Some(store) => Some(store.verify_chain()?.is_intact()),
            None => None,
        };
        Ok(StatusReport {
            tier: gov.hierarchy().current_tier(),
            balance: ledger.balance(),
            floor: ledger.floor(),
            balance_status: BalanceStatus::classify(
                ledger.balance(),
                ledger.floor(),
                self.config.hierarchy.min_balance,
            ),
            resource_health: gauge.health(),
            last_sample: gauge.last(),
            error_rate: self.vitals().error_rate()?,
            unresolved: gov.backlog().len(),
            open_sessions: gov.dialogue().open_sessions().len(),
            tasks_running: self.scheduler.statuses().iter().filter(|t| t.running).count(),
            audit_chain_intact,
            generated_at: Utc::now(),
        })
    }

    pub fn economics(&self, limit: usize) -> warden_core::Result<EconomicsReport> {
        let ledger = self.governor.ledger();
        Ok(EconomicsReport {
            balance: ledger.balance(),
            floor: ledger.floor(),
            trend: ledger.trend()?,
            balance_status: BalanceStatus::classify(
                ledger.balance(),
                ledger.floor(),
                self.config.hierarchy.min_balance,
            ),
            transactions: ledger.history(limit)?,
        })
    }

    fn backends(&self) -> Vec<BackendReport> {
        let stats = self.governor.dispatcher().stats();
        self.registry
            .profiles()
            .into_iter()
            .map(|profile| BackendReport {
                stats: stats.get(&profile.id).copied().unwrap_or_default(),
                profile,
            })
            .collect()
    }

    fn vitals(&self) -> &Vitals {
        self.governor.vitals()
    }
}
