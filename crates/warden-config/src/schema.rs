use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use warden_core::{NeedsTier, Severity};

/// Names of the maintenance tasks the runtime knows how to build.
pub const BUILTIN_TASKS: &[&str] = &[
    "system_health_check",
    "economic_review",
    "risk_backlog_review",
    "reflection_cycle",
    "goal_review",
];

/// Root configuration, maps to `warden.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub ledger: LedgerConfig,
    pub gate: GateConfig,
    pub router: RouterConfig,
    pub hierarchy: HierarchyConfig,
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

// ── Ledger ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Balance used when the journal has no transactions yet.
    pub starting_balance: f64,
    /// Below this balance only local backends may be routed to.
    pub budget_floor: f64,
    /// Number of recent transactions used to compute the balance trend.
    pub trend_window: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_balance: 100.0,
            budget_floor: 10.0,
            trend_window: 10,
        }
    }
}

// ── Policy gate ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Install the built-in mandate rules ahead of the configured ones.
    pub builtin_rules: bool,
    /// Unresolved flagged requests tolerated before new requests are flagged.
    pub flag_backlog_limit: usize,
    /// Extra keyword rules, evaluated after the built-ins in declaration order.
    pub rules: Vec<RuleConfig>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            builtin_rules: true,
            flag_backlog_limit: 5,
            rules: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    pub severity: Severity,
    /// The rule matches when any keyword occurs in the request (case-insensitive).
    pub keywords: Vec<String>,
    /// ...unless one of these also occurs.
    #[serde(default)]
    pub unless: Vec<String>,
    /// Alternative proposed during dialogue when this rule triggers.
    #[serde(default)]
    pub alternative: Option<String>,
}

// ── Router ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Refuse to route when the marginal-value score is negative.
    pub gate_on_marginal_value: bool,
    /// Minimum capability tier for operator requests.
    pub default_min_tier: u8,
    /// Units an operator request is expected to consume.
    pub default_estimated_units: u64,
    /// Value attributed to completing an operator request.
    pub default_task_value: f64,
    /// Timeout for one HTTP backend invocation.
    pub request_timeout_secs: u64,
    /// Backend registry. Only explicit admin updates change it at runtime.
    pub backends: Vec<BackendConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            gate_on_marginal_value: false,
            default_min_tier: 1,
            default_estimated_units: 1_000,
            default_task_value: 1.0,
            request_timeout_secs: 60,
            backends: default_backends(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub id: String,
    /// Capability tier; higher is more capable.
    pub tier: u8,
    /// Cost per unit (token) in the ledger's currency.
    pub cost_per_unit: f64,
    #[serde(default = "default_true")]
    pub available: bool,
    /// Local / no-marginal-cost backend, eligible below the budget floor.
    #[serde(default)]
    pub local: bool,
    /// HTTP endpoint of an Ollama-compatible generate API.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Model name sent to the endpoint (defaults to the part of `id` after ':').
    #[serde(default)]
    pub model: Option<String>,
}

fn default_backends() -> Vec<BackendConfig> {
    let local = |id: &str, tier: u8| BackendConfig {
        id: id.into(),
        tier,
        cost_per_unit: 0.0,
        available: true,
        local: true,
        endpoint: Some("http://localhost:11434/api/generate".into()),
        model: None,
    };
    vec![
        local("local:llama2", 1),
        local("local:mistral", 2),
        BackendConfig {
            id: "remote:reasoning".into(),
            tier: 3,
            cost_per_unit: 0.000_02,
            available: false,
            local: false,
            endpoint: None,
            model: None,
        },
    ]
}

// ── Hierarchy ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Physiological stability: balance at or above this.
    pub min_balance: f64,
    /// Physiological stability: resource health (0.0–1.0) at or above this.
    pub min_resource_health: f64,
    /// Memory usage (percent) at which resource health reaches zero.
    pub max_memory_pct: f64,
    /// Disk usage (percent) at which resource health reaches zero.
    pub max_disk_pct: f64,
    /// Growth stability: failure ratio among recent runs at or below this.
    pub max_error_rate: f64,
    /// Cognitive stability: unresolved risk flags at or below this.
    pub max_flag_backlog: usize,
    /// How long a tier must stay stable before promotion.
    pub promotion_window_secs: u64,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            min_balance: 50.0,
            min_resource_health: 0.05,
            max_memory_pct: 80.0,
            max_disk_pct: 85.0,
            max_error_rate: 0.25,
            max_flag_backlog: 3,
            promotion_window_secs: 300,
        }
    }
}

// ── Scheduler ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often the scheduler checks for due tasks.
    pub tick_secs: u64,
    /// Timeout applied to every task run.
    pub task_timeout_secs: u64,
    pub tasks: Vec<TaskConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let task = |name: &str, interval_secs: u64, required_tier: NeedsTier| TaskConfig {
            name: name.into(),
            interval_secs,
            required_tier,
            enabled: true,
        };
        Self {
            tick_secs: 10,
            task_timeout_secs: 120,
            tasks: vec![
                task("system_health_check", 30 * 60, NeedsTier::Physiological),
                task("economic_review", 60 * 60, NeedsTier::Physiological),
                task("risk_backlog_review", 6 * 60 * 60, NeedsTier::Growth),
                task("reflection_cycle", 24 * 60 * 60, NeedsTier::Cognitive),
                task("goal_review", 12 * 60 * 60, NeedsTier::SelfActualization),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    pub interval_secs: u64,
    pub required_tier: NeedsTier,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// ── Store ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("warden.db"),
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty", "compact" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

fn default_true() -> bool {
    true
}

// ── Validation ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let icon = match self.severity {
            WarningSeverity::Error => "❌",
            WarningSeverity::Warning => "⚠️ ",
            WarningSeverity::Info => "💡",
        };
        write!(f, "{} {}: {}", icon, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl WardenConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Ledger ───
        if self.ledger.budget_floor < 0.0 {
            warnings.push(ConfigWarning {
                field: "ledger.budget_floor".into(),
                message: format!("floor {} is negative", self.ledger.budget_floor),
                severity: WarningSeverity::Error,
                hint: Some("Use 0.0 to disable the floor".into()),
            });
        } else if self.ledger.budget_floor > self.ledger.starting_balance {
            warnings.push(ConfigWarning {
                field: "ledger.budget_floor".into(),
                message: format!(
                    "floor {:.2} is above the starting balance {:.2}; only local backends will route",
                    self.ledger.budget_floor, self.ledger.starting_balance
                ),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }
        if self.ledger.trend_window < 2 {
            warnings.push(ConfigWarning {
                field: "ledger.trend_window".into(),
                message: "trend window below 2 always reports a flat trend".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set to e.g. 10".into()),
            });
        }

        // ── Gate rules ───
        let mut rule_names = HashSet::new();
        for rule in &self.gate.rules {
            if !rule_names.insert(rule.name.as_str()) {
                warnings.push(ConfigWarning {
                    field: format!("gate.rules.{}", rule.name),
                    message: "duplicate rule name".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
            if rule.keywords.iter().all(|k| k.trim().is_empty()) {
                warnings.push(ConfigWarning {
                    field: format!("gate.rules.{}.keywords", rule.name),
                    message: "rule has no keywords and will never match".into(),
                    severity: WarningSeverity::Warning,
                    hint: None,
                });
            }
        }
        if !self.gate.builtin_rules && self.gate.rules.is_empty() {
            warnings.push(ConfigWarning {
                field: "gate".into(),
                message: "no mandate rules configured; every request will be allowed".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set gate.builtin_rules = true".into()),
            });
        }

        // ── Backends ───
        let mut backend_ids = HashSet::new();
        for b in &self.router.backends {
            if b.id.is_empty() {
                warnings.push(ConfigWarning {
                    field: "router.backends".into(),
                    message: "backend with empty id".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
            if !backend_ids.insert(b.id.as_str()) {
                warnings.push(ConfigWarning {
                    field: format!("router.backends.{}", b.id),
                    message: "duplicate backend id".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
            if b.cost_per_unit < 0.0 {
                warnings.push(ConfigWarning {
                    field: format!("router.backends.{}.cost_per_unit", b.id),
                    message: format!("cost {} is negative", b.cost_per_unit),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
            if b.local && b.cost_per_unit > 0.0 {
                warnings.push(ConfigWarning {
                    field: format!("router.backends.{}", b.id),
                    message: "backend is flagged local but has a marginal cost".into(),
                    severity: WarningSeverity::Info,
                    hint: Some("Local backends are still eligible below the budget floor".into()),
                });
            }
        }
        if !self.router.backends.iter().any(|b| b.local && b.available) {
            warnings.push(ConfigWarning {
                field: "router.backends".into(),
                message: "no available local backend, so nothing can route below the budget floor".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Hierarchy ───
        let h = &self.hierarchy;
        if !(0.0..=1.0).contains(&h.min_resource_health) {
            warnings.push(ConfigWarning {
                field: "hierarchy.min_resource_health".into(),
                message: format!("{} is outside 0.0–1.0", h.min_resource_health),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        if !(0.0..=1.0).contains(&h.max_error_rate) {
            warnings.push(ConfigWarning {
                field: "hierarchy.max_error_rate".into(),
                message: format!("{} is outside 0.0–1.0", h.max_error_rate),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        if h.max_memory_pct <= 0.0 || h.max_disk_pct <= 0.0 {
            warnings.push(ConfigWarning {
                field: "hierarchy".into(),
                message: "resource limits must be positive percentages".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        // ── Scheduler ───
        if self.scheduler.tick_secs == 0 {
            warnings.push(ConfigWarning {
                field: "scheduler.tick_secs".into(),
                message: "tick interval is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 10".into()),
            });
        }
        if self.scheduler.task_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "scheduler.task_timeout_secs".into(),
                message: "task timeout is 0; every run would time out".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        let mut task_names = HashSet::new();
        for t in &self.scheduler.tasks {
            if !BUILTIN_TASKS.contains(&t.name.as_str()) {
                warnings.push(ConfigWarning {
                    field: format!("scheduler.tasks.{}", t.name),
                    message: format!("unknown task '{}'", t.name),
                    severity: WarningSeverity::Error,
                    hint: Some(format!("Known tasks: {}", BUILTIN_TASKS.join(", "))),
                });
            }
            if !task_names.insert(t.name.as_str()) {
                warnings.push(ConfigWarning {
                    field: format!("scheduler.tasks.{}", t.name),
                    message: "task declared twice".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
            if t.interval_secs == 0 {
                warnings.push(ConfigWarning {
                    field: format!("scheduler.tasks.{}.interval_secs", t.name),
                    message: "interval is 0".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
