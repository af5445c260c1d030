use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{error, info, warn};
use warden_config::GateConfig;
use warden_core::{
    ActionRecord, ActionRequest, Journal, JournalRecord, NeedsTier, Outcome, RequestId, Severity,
    WardenError,
};

use crate::rules::{MandateRule, rules_from_config};

/// Who authorised a waiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaiverAuthority {
    /// Final override issued from a dialogue. Cannot waive catastrophic rules.
    OperatorOverride,
    /// Explicit acknowledgment of risk after a safety lock-out.
    RiskAcknowledgment,
}

/// Suppresses one rule's contribution to the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waiver {
    pub rule: String,
    pub authority: WaiverAuthority,
}

impl Waiver {
    pub fn covers(&self, rule: &str, severity: Severity) -> bool {
        self.rule == rule
            && (severity < Severity::Catastrophic || self.authority == WaiverAuthority::RiskAcknowledgment)
    }
}

/// State the rules may consult besides the request itself.
#[derive(Debug, Clone)]
pub struct GateContext {
    pub balance: f64,
    pub floor: f64,
    pub tier: NeedsTier,
    pub unresolved_flags: usize,
    pub waivers: Vec<Waiver>,
}

impl Default for GateContext {
    fn default() -> Self {
        Self {
            balance: 0.0,
            floor: 0.0,
            tier: NeedsTier::Physiological,
            unresolved_flags: 0,
            waivers: Vec::new(),
        }
    }
}

impl GateContext {
    pub fn with_waivers(mut self, waivers: Vec<Waiver>) -> Self {
        self.waivers = waivers;
        self
    }

    fn waived(&self, rule: &str, severity: Severity) -> bool {
        self.waivers.iter().any(|w| w.covers(rule, severity))
    }
}

/// One matched rule inside a verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredRule {
    pub name: String,
    pub severity: Severity,
    pub reason: String,
    pub waived: bool,
}

/// The gate's decision on one request. Only [`PolicyGate::evaluate`] builds these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    request_id: RequestId,
    outcome: Outcome,
    triggered: Vec<TriggeredRule>,
    rationale: String,
    fault: Option<String>,
    faulted_rule: Option<String>,
    evaluated_at: DateTime<Utc>,
}

impl PolicyVerdict {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn triggered(&self) -> &[TriggeredRule] {
        &self.triggered
    }

    /// Matched rules that still count toward the outcome.
    pub fn active(&self) -> impl Iterator<Item = &TriggeredRule> {
        self.triggered.iter().filter(|t| !t.waived)
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    /// Set when a rule faulted and the gate failed closed.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.evaluated_at
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.active().map(|t| t.severity).max()
    }

    /// Catastrophic matches and rule faults can only be cleared by a risk acknowledgment.
    pub fn is_lockout(&self) -> bool {
        self.fault.is_some() || self.max_severity() == Some(Severity::Catastrophic)
    }

    /// Rules that caused a lock-out (a faulting rule is listed by name).
    pub fn lockout_rules(&self) -> Vec<String> {
        let mut rules: Vec<String> = self
            .active()
            .filter(|t| t.severity == Severity::Catastrophic)
            .map(|t| t.name.clone())
            .collect();
        if let Some(name) = &self.faulted_rule {
            rules.push(name.clone());
        }
        rules
    }

    /// Unwaived non-catastrophic rules, which an operator override may waive.
    pub fn overridable(&self) -> Vec<Waiver> {
        self.active()
            .filter(|t| t.severity < Severity::Catastrophic)
            .map(|t| Waiver {
                rule: t.name.clone(),
                authority: WaiverAuthority::OperatorOverride,
            })
            .collect()
    }
}

/// Evaluates requests against the ordered mandate rules.
///
/// Every verdict is appended to the journal's `actions` table before it is
/// returned. If the append fails the caller gets an error and no verdict, so
/// nothing can act on an unaudited decision.
pub struct PolicyGate {
    rules: Vec<Box<dyn MandateRule>>,
    journal: Arc<dyn Journal>,
}

impl PolicyGate {
    /// A gate with no rules; every request is allowed until rules are added.
    pub fn new(journal: Arc<dyn Journal>) -> Self {
        Self {
            rules: Vec::new(),
            journal,
        }
    }

    pub fn from_config(cfg: &GateConfig, journal: Arc<dyn Journal>) -> Self {
        Self {
            rules: rules_from_config(cfg),
            journal,
        }
    }

    pub fn add_rule(&mut self, rule: Box<dyn MandateRule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn rule(&self, name: &str) -> Option<&dyn MandateRule> {
        self.rules.iter().find(|r| r.name() == name).map(|r| r.as_ref())
    }

    /// Evaluate a request against all rules, in order.
    pub fn evaluate(&self, request: &ActionRequest, ctx: &GateContext) -> warden_core::Result<PolicyVerdict> {
        let mut triggered = Vec::new();
        let mut fault = None;
        let mut faulted_rule = None;

        for rule in &self.rules {
            let result = catch_unwind(AssertUnwindSafe(|| rule.evaluate(request, ctx)));
            let evaluation = match result {
                Ok(Ok(None)) => continue,
                Ok(Ok(Some(reason))) => Ok(reason),
                Ok(Err(e)) => Err(format!("rule '{}' failed: {}", rule.name(), e)),
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "panic".into());
                    Err(format!("rule '{}' panicked: {}", rule.name(), msg))
                }
            };
            let reason = match evaluation {
                Ok(reason) => reason,
                // An acknowledged fault no longer blocks; it is recorded as a waived match.
                Err(f) if ctx.waived(rule.name(), Severity::Catastrophic) => {
                    warn!(request_id = %request.id(), rule = rule.name(), fault = %f, "faulting rule waived by risk acknowledgment");
                    triggered.push(TriggeredRule {
                        name: rule.name().to_string(),
                        severity: Severity::Catastrophic,
                        reason: f,
                        waived: true,
                    });
                    continue;
                }
                Err(f) => {
                    fault = Some(f);
                    faulted_rule = Some(rule.name().to_string());
                    break;
                }
            };

            let severity = rule.severity();
            let waived = ctx.waived(rule.name(), severity);
            if waived {
                info!(request_id = %request.id(), rule = rule.name(), "matched rule waived");
            }
            triggered.push(TriggeredRule {
                name: rule.name().to_string(),
                severity,
                reason,
                waived,
            });

            if severity == Severity::Catastrophic && !waived {
                warn!(
                    request_id = %request.id(),
                    rule = rule.name(),
                    "catastrophic rule matched, skipping remaining rules"
                );
                break;
            }
        }

        let outcome = if fault.is_some() {
            Outcome::Block
        } else {
            Outcome::from_severity(triggered.iter().filter(|t| !t.waived).map(|t| t.severity).max())
        };

        let rationale = compose_rationale(&triggered, fault.as_deref());
        let verdict = PolicyVerdict {
            request_id: request.id(),
            outcome,
            triggered,
            rationale,
            fault,
            faulted_rule,
            evaluated_at: Utc::now(),
        };

        if let Some(f) = verdict.fault() {
            error!(request_id = %request.id(), fault = f, "mandate rule faulted, failing closed");
        }

        self.journal
            .append(JournalRecord::Action(ActionRecord {
                request_id: verdict.request_id,
                description: request.description().to_string(),
                urgent: request.is_urgent(),
                outcome: verdict.outcome,
                rationale: verdict.rationale.clone(),
                timestamp: verdict.evaluated_at,
            }))
            .map_err(|e| {
                error!(request_id = %request.id(), error = %e, "failed to append verdict to audit log");
                WardenError::Audit(e.to_string())
            })?;

        info!(
            request_id = %request.id(),
            outcome = verdict.outcome.as_str(),
            triggered = verdict.triggered.len(),
            "policy verdict recorded"
        );
        Ok(verdict)
    }
}

fn compose_rationale(triggered: &[TriggeredRule], fault: Option<&str>) -> String {
    let mut parts: Vec<String> = triggered
        .iter()
        .map(|t| {
            let waived = if t.waived { " [waived]" } else { "" };
            format!("{} ({}): {}{}", t.name, t.severity, t.reason, waived)
        })
        .collect();
    if let Some(f) = fault {
        parts.push(format!("fail-closed: {}", f));
    }
    if parts.is_empty() {
        "no mandate rule matched".into()
    } else {
        parts.join("; ")
    }
}
