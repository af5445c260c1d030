use warden_config::{GateConfig, RuleConfig};
use warden_core::{ActionRequest, Severity};

use crate::gate::GateContext;

/// A single mandate rule.
///
/// Rules are pure predicates over the request and the gate context. A rule
/// returns `Ok(Some(reason))` when it matches, `Ok(None)` when it does not,
/// and `Err` when it cannot decide; the gate treats errors (and panics) as
/// faults and fails closed.
pub trait MandateRule: Send + Sync {
    fn name(&self) -> &str;

    fn severity(&self) -> Severity;

    fn evaluate(&self, request: &ActionRequest, ctx: &GateContext) -> warden_core::Result<Option<String>>;

    /// A safer action to propose during dialogue when this rule matches.
    fn alternative(&self) -> Option<&str> {
        None
    }
}

/// Whole-word, case-insensitive phrase match.
pub(crate) fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let phrase = phrase.trim().to_lowercase();
    if phrase.is_empty() {
        return false;
    }
    let haystack = haystack.to_lowercase();
    let bytes = haystack.as_bytes();
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(&phrase) {
        let start = from + pos;
        let end = start + phrase.len();
        let before_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let after_ok = end == bytes.len() || !is_word_byte(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        from = start + 1;
        while !haystack.is_char_boundary(from) {
            from += 1;
        }
    }
    false
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

// ── Keyword rules ──────────────────────────────────────────────

/// Matches when the request mentions any keyword and none of the `unless` phrases.
pub struct KeywordRule {
    name: String,
    severity: Severity,
    keywords: Vec<String>,
    unless: Vec<String>,
    alternative: Option<String>,
}

impl KeywordRule {
    pub fn new<I, S>(name: impl Into<String>, severity: Severity, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            severity,
            keywords: keywords.into_iter().map(Into::into).collect(),
            unless: Vec::new(),
            alternative: None,
        }
    }

    pub fn unless<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unless = phrases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternative = Some(alternative.into());
        self
    }
}

impl From<&RuleConfig> for KeywordRule {
    fn from(cfg: &RuleConfig) -> Self {
        let rule = KeywordRule::new(cfg.name.clone(), cfg.severity, cfg.keywords.clone())
            .unless(cfg.unless.clone());
        match &cfg.alternative {
            Some(alt) => rule.with_alternative(alt.clone()),
            None => rule,
        }
    }
}

impl MandateRule for KeywordRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn evaluate(&self, request: &ActionRequest, _ctx: &GateContext) -> warden_core::Result<Option<String>> {
        let text = request.description();
        let Some(hit) = self.keywords.iter().find(|k| contains_phrase(text, k)) else {
            return Ok(None);
        };
        if self.unless.iter().any(|u| contains_phrase(text, u)) {
            return Ok(None);
        }
        Ok(Some(format!("request mentions '{}'", hit)))
    }

    fn alternative(&self) -> Option<&str> {
        self.alternative.as_deref()
    }
}

// ── Context rules ──────────────────────────────────────────────

/// Flags new work while the balance sits below the budget floor.
pub struct BudgetPrudenceRule;

impl MandateRule for BudgetPrudenceRule {
    fn name(&self) -> &str {
        "budget_prudence"
    }

    fn severity(&self) -> Severity {
        Severity::Caution
    }

    fn evaluate(&self, _request: &ActionRequest, ctx: &GateContext) -> warden_core::Result<Option<String>> {
        if ctx.balance < ctx.floor {
            Ok(Some(format!(
                "balance {:.2} is below the budget floor {:.2}",
                ctx.balance, ctx.floor
            )))
        } else {
            Ok(None)
        }
    }

    fn alternative(&self) -> Option<&str> {
        Some("Defer the request until the balance recovers, or run it on a local backend")
    }
}

/// Flags new work while too many flagged requests are still unresolved.
pub struct RiskBacklogRule {
    pub limit: usize,
}

impl MandateRule for RiskBacklogRule {
    fn name(&self) -> &str {
        "risk_backlog"
    }

    fn severity(&self) -> Severity {
        Severity::Caution
    }

    fn evaluate(&self, _request: &ActionRequest, ctx: &GateContext) -> warden_core::Result<Option<String>> {
        if ctx.unresolved_flags > self.limit {
            Ok(Some(format!(
                "{} flagged requests are unresolved (limit {})",
                ctx.unresolved_flags, self.limit
            )))
        } else {
            Ok(None)
        }
    }

    fn alternative(&self) -> Option<&str> {
        Some("Resolve the outstanding flagged requests first")
    }
}

// ── Built-in set ───────────────────────────────────────────────

/// The built-in mandates, in priority order.
pub fn default_rules(flag_backlog_limit: usize) -> Vec<Box<dyn MandateRule>> {
    vec![
        Box::new(
            KeywordRule::new(
                "non_maleficence.harm",
                Severity::Catastrophic,
                [
                    "harm",
                    "injure",
                    "sabotage",
                    "malware",
                    "exfiltrate",
                    "disable safety",
                    "self-destruct",
                ],
            )
            .with_alternative("Describe the outcome you need without damaging people, systems or resources"),
        ),
        Box::new(
            KeywordRule::new(
                "non_maleficence.destructive",
                Severity::Critical,
                ["delete", "drop", "wipe", "destroy", "purge", "rm -rf", "truncate", "format disk"],
            )
            .unless(["backup", "back up", "snapshot"])
            .with_alternative("Take a backup or snapshot first, then make the change"),
        ),
        Box::new(
            KeywordRule::new(
                "veracity",
                Severity::Critical,
                ["deceive", "lie", "falsify", "fabricate", "conceal", "cover up"],
            )
            .with_alternative("Report the facts transparently and record the reasoning"),
        ),
        Box::new(BudgetPrudenceRule),
        Box::new(RiskBacklogRule {
            limit: flag_backlog_limit,
        }),
    ]
}

/// Built-ins (if enabled) followed by the configured keyword rules.
pub fn rules_from_config(cfg: &GateConfig) -> Vec<Box<dyn MandateRule>> {
    let mut rules = if cfg.builtin_rules {
        default_rules(cfg.flag_backlog_limit)
    } else {
        Vec::new()
    };
    for rule in &cfg.rules {
        rules.push(Box::new(KeywordRule::from(rule)));
    }
    rules
}
