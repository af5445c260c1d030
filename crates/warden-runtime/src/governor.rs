//! The foreground path: every operator request goes through the policy gate,
//! the dialogue when the gate objects, the cost router, and the ledger.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use warden_config::RouterConfig;
use warden_core::{
    ActionRecord, ActionRequest, DialogueStage, ErrorKind, JournalRecord, Outcome, RequestId,
    SessionId, Transaction, WardenError,
};
use warden_policy::{
    DialogueEngine, DialogueStep, GateContext, HierarchyManager, OperatorInput, PolicyGate,
    PolicyVerdict, Resolution, TierEvaluation, Waiver, WaiverAuthority,
};
use warden_router::{Dispatch, Dispatcher, TaskProfile};

use crate::backlog::{PendingReason, PendingRequest, RiskBacklog};
use crate::ledger::Ledger;
use crate::maintenance::Vitals;

/// Routing hints attached to a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHints {
    /// Minimum backend capability tier.
    pub min_tier: u8,
    pub estimated_units: u64,
    pub estimated_value: f64,
}

impl Default for ExecutionHints {
    fn default() -> Self {
        Self::from(&RouterConfig::default())
    }
}

impl From<&RouterConfig> for ExecutionHints {
    fn from(cfg: &RouterConfig) -> Self {
        Self {
            min_tier: cfg.default_min_tier,
            estimated_units: cfg.default_estimated_units,
            estimated_value: cfg.default_task_value,
        }
    }
}

impl ExecutionHints {
    pub fn with_min_tier(mut self, min_tier: u8) -> Self {
        self.min_tier = min_tier;
        self
    }

    fn profile(&self, request_id: RequestId) -> TaskProfile {
        TaskProfile {
            request_id,
            min_tier: self.min_tier,
            estimated_units: self.estimated_units,
            estimated_value: self.estimated_value,
        }
    }
}

/// A request that was routed, executed, and charged.
#[derive(Debug, Clone, Serialize)]
pub struct Execution {
    pub request: ActionRequest,
    pub outcome: Outcome,
    pub dispatch: Dispatch,
    pub transaction: Transaction,
}

/// The operator-visible result of a submission or dialogue input.
#[derive(Debug, Clone)]
pub enum Submission {
    /// Executed immediately.
    Completed(Box<Execution>),
    /// The gate objected; show the prompt and wait for operator input.
    Dialogue {
        session_id: SessionId,
        stage: DialogueStage,
        text: String,
    },
    /// Not executed. `kind` is `SafetyLockout` when only a risk
    /// acknowledgment can clear it, `PolicyViolation` otherwise.
    Blocked {
        request_id: RequestId,
        kind: ErrorKind,
        rationale: String,
        rules: Vec<String>,
    },
}

impl Submission {
    pub fn is_lockout(&self) -> bool {
        matches!(self, Self::Blocked { kind: ErrorKind::SafetyLockout, .. })
    }

    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::Dialogue { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }

    /// The block notice as an error, for callers that want `?`.
    pub fn to_error(&self) -> Option<WardenError> {
        match self {
            Self::Blocked {
                request_id,
                kind: ErrorKind::SafetyLockout,
                rules,
                ..
            } => Some(WardenError::SafetyLockout {
                request_id: *request_id,
                rules: rules.clone(),
            }),
            Self::Blocked {
                request_id, rationale, ..
            } => Some(WardenError::PolicyViolation {
                request_id: *request_id,
                rationale: rationale.clone(),
            }),
            _ => None,
        }
    }
}

/// Whether a verdict may still open a dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    /// First pass, or after a risk acknowledgment.
    Fresh,
    /// Re-entry after the dialogue resolved; flags proceed, blocks stop.
    AfterDialogue,
}

/// What the foreground path does after a gate or dialogue decision.
enum Next {
    Reply(Submission),
    Execute(ActionRequest, PolicyVerdict, ExecutionHints),
}

/// Orchestrates gate, dialogue, router and ledger for operator requests.
pub struct Governor {
    gate: Arc<PolicyGate>,
    dialogue: DialogueEngine,
    dispatcher: Dispatcher,
    ledger: Arc<Ledger>,
    hierarchy: Arc<HierarchyManager>,
    backlog: Arc<RiskBacklog>,
    vitals: Vitals,
    hints: ExecutionHints,
}

impl Governor {
    pub fn new(
        gate: Arc<PolicyGate>,
        dialogue: DialogueEngine,
        dispatcher: Dispatcher,
        hierarchy: Arc<HierarchyManager>,
        vitals: Vitals,
        hints: ExecutionHints,
    ) -> Self {
        Self {
            gate,
            dialogue,
            dispatcher,
            ledger: vitals.ledger.clone(),
            hierarchy,
            backlog: vitals.backlog.clone(),
            vitals,
            hints,
        }
    }

    pub fn gate(&self) -> &PolicyGate {
        &self.gate
    }

    pub fn dialogue(&self) -> &DialogueEngine {
        &self.dialogue
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn hierarchy(&self) -> &Arc<HierarchyManager> {
        &self.hierarchy
    }

    pub fn backlog(&self) -> &Arc<RiskBacklog> {
        &self.backlog
    }

    pub fn vitals(&self) -> &Vitals {
        &self.vitals
    }

    pub fn default_hints(&self) -> ExecutionHints {
        self.hints
    }

    /// Submit a request with the configured routing defaults.
    pub async fn submit(&self, request: ActionRequest) -> warden_core::Result<Submission> {
        self.submit_with(request, self.hints).await
    }

    pub async fn submit_with(
        &self,
        request: ActionRequest,
        hints: ExecutionHints,
    ) -> warden_core::Result<Submission> {
        info!(request_id = %request.id(), urgent = request.is_urgent(), originator = %request.originator(), "request submitted");
        let next = self.process(request, hints, Vec::new(), Entry::Fresh)?;
        self.finish(next).await
    }

    /// Apply one operator input to an open dialogue.
    pub async fn respond(&self, session_id: SessionId, input: OperatorInput) -> warden_core::Result<Submission> {
        let step = match self.dialogue.respond(session_id, input) {
            Err(WardenError::SessionAborted {
                session_id,
                request_id,
            }) => {
                self.backlog.mark(request_id, PendingReason::Aborted);
                warn!(session_id = %session_id, request_id = %request_id, "request left unresolved");
                return Err(WardenError::SessionAborted {
                    session_id,
                    request_id,
                });
            }
            other => other?,
        };
        let next = self.follow(step)?;
        self.finish(next).await
    }

    /// Wait for the next operator input on `session_id` and apply it.
    ///
    /// Cancelling the wait, or closing the input channel, abandons the
    /// session and leaves the request unresolved.
    pub async fn await_input(
        &self,
        session_id: SessionId,
        inputs: &mut mpsc::Receiver<OperatorInput>,
        cancel: &CancellationToken,
    ) -> warden_core::Result<Submission> {
        let input = tokio::select! {
            _ = cancel.cancelled() => None,
            input = inputs.recv() => input,
        };
        match input {
            Some(input) => self.respond(session_id, input).await,
            None => {
                let aborted = self.dialogue.abandon(session_id)?;
                if let WardenError::SessionAborted { request_id, .. } = &aborted {
                    self.backlog.mark(*request_id, PendingReason::Aborted);
                }
                Err(aborted)
            }
        }
    }

    /// Clear a safety lock-out. The locked-out request re-enters the gate as a
    /// successor with risk-acknowledgment waivers for the rules that caused it.
    pub async fn acknowledge_risk(&self, request_id: RequestId) -> warden_core::Result<Submission> {
        let pending = self
            .backlog
            .get(request_id)
            .ok_or(WardenError::UnknownLockout(request_id))?;
        if pending.reason != PendingReason::Lockout {
            return Err(WardenError::AcknowledgmentRejected(format!(
                "request {request_id} is {}, not locked out",
                pending.reason
            )));
        }
        if pending.lockout_rules.is_empty() {
            return Err(WardenError::AcknowledgmentRejected(format!(
                "request {request_id} names no lock-out rules"
            )));
        }
        self.backlog.resolve(request_id);

        let waivers = pending
            .lockout_rules
            .iter()
            .map(|rule| Waiver {
                rule: rule.clone(),
                authority: WaiverAuthority::RiskAcknowledgment,
            })
            .collect();
        warn!(request_id = %request_id, rules = ?pending.lockout_rules, "operator acknowledged risk");
        let successor = pending.request.successor();
        let next = self.process(successor, pending.hints, waivers, Entry::Fresh)?;
        self.finish(next).await
    }

    /// Withdraw an aborted or locked-out request without executing it. The
    /// dismissal is written to the audit log before the backlog entry goes.
    pub fn dismiss(&self, request_id: RequestId) -> warden_core::Result<PendingRequest> {
        let pending = self
            .backlog
            .get(request_id)
            .ok_or(WardenError::NotPending(request_id))?;
        if pending.reason == PendingReason::InDialogue {
            return Err(WardenError::DismissRejected(format!(
                "request {request_id} is still in dialogue; cancel the session first"
            )));
        }

        self.vitals
            .journal
            .append(JournalRecord::Action(ActionRecord {
                request_id,
                description: pending.request.description().to_string(),
                urgent: pending.request.is_urgent(),
                outcome: Outcome::Block,
                rationale: format!("dismissed by operator ({}): {}", pending.reason, pending.rationale),
                timestamp: Utc::now(),
            }))
            .map_err(|e| {
                error!(request_id = %request_id, error = %e, "failed to append dismissal to audit log");
                WardenError::Audit(e.to_string())
            })?;
        self.backlog.resolve(request_id);
        warn!(request_id = %request_id, reason = %pending.reason, "request dismissed by operator");

        if let Err(e) = self.reevaluate_hierarchy() {
            error!(request_id = %request_id, error = %e, "hierarchy re-evaluation failed");
        }
        Ok(pending)
    }

    /// Re-evaluate the needs tier against a fresh signal snapshot.
    pub fn reevaluate_hierarchy(&self) -> warden_core::Result<TierEvaluation> {
        let signals = self.vitals.signals()?;
        self.hierarchy.reevaluate(&signals)
    }

    /// Operator deposit, followed by a hierarchy re-evaluation.
    pub fn credit(&self, amount: f64, memo: &str) -> warden_core::Result<Transaction> {
        let tx = self.ledger.credit(amount, memo)?;
        self.reevaluate_hierarchy()?;
        Ok(tx)
    }

    pub fn unresolved(&self) -> Vec<PendingRequest> {
        self.backlog.list()
    }

    fn context(&self, waivers: Vec<Waiver>) -> GateContext {
        GateContext {
            balance: self.ledger.balance(),
            floor: self.ledger.floor(),
            tier: self.hierarchy.current_tier(),
            unresolved_flags: self.backlog.len(),
            waivers,
        }
    }

    fn process(
        &self,
        request: ActionRequest,
        hints: ExecutionHints,
        waivers: Vec<Waiver>,
        entry: Entry,
    ) -> warden_core::Result<Next> {
        let verdict = self.gate.evaluate(&request, &self.context(waivers))?;

        if verdict.is_lockout() {
            return Ok(Next::Reply(self.lock_out(request, &verdict, hints)));
        }

        match verdict.outcome() {
            Outcome::Allow => Ok(Next::Execute(request, verdict, hints)),
            Outcome::Flag if request.is_urgent() || entry == Entry::AfterDialogue => {
                info!(request_id = %request.id(), "flagged request proceeds without dialogue");
                Ok(Next::Execute(request, verdict, hints))
            }
            Outcome::Block if request.is_urgent() || entry == Entry::AfterDialogue => {
                warn!(request_id = %request.id(), rationale = verdict.rationale(), "request blocked");
                Ok(Next::Reply(Submission::Blocked {
                    request_id: request.id(),
                    kind: ErrorKind::PolicyViolation,
                    rationale: verdict.rationale().to_string(),
                    rules: verdict.active().map(|t| t.name.clone()).collect(),
                }))
            }
            Outcome::Flag | Outcome::Block => {
                let pending = PendingRequest::new(request.clone(), PendingReason::InDialogue, &verdict, hints);
                let step = self.dialogue.open(request, verdict, &self.gate)?;
                self.backlog.insert(pending);
                self.follow(step)
            }
        }
    }

    fn lock_out(&self, request: ActionRequest, verdict: &PolicyVerdict, hints: ExecutionHints) -> Submission {
        let rules = verdict.lockout_rules();
        error!(
            request_id = %request.id(),
            rules = ?rules,
            rationale = verdict.rationale(),
            "safety lock-out; risk acknowledgment required"
        );
        let request_id = request.id();
        self.backlog
            .insert(PendingRequest::new(request, PendingReason::Lockout, verdict, hints));
        Submission::Blocked {
            request_id,
            kind: ErrorKind::SafetyLockout,
            rationale: verdict.rationale().to_string(),
            rules,
        }
    }

    fn follow(&self, step: DialogueStep) -> warden_core::Result<Next> {
        match step {
            DialogueStep::Prompt {
                session_id,
                stage,
                text,
            } => Ok(Next::Reply(Submission::Dialogue {
                session_id,
                stage,
                text,
            })),
            DialogueStep::Revised { session_id, request } => self.reconsider(session_id, request),
            DialogueStep::Resolved { session, resolution } => {
                let hints = request_hints(self.backlog.resolve(session.request.id()), self.hints);
                let successor = session.request.successor();
                match resolution {
                    Resolution::Accepted => {
                        info!(session_id = %session.id, request_id = %successor.id(), "recommendation accepted");
                        self.process(successor, hints, Vec::new(), Entry::AfterDialogue)
                    }
                    Resolution::Overridden { waivers } => {
                        warn!(
                            session_id = %session.id,
                            request_id = %successor.id(),
                            waived = waivers.len(),
                            "operator override"
                        );
                        self.process(successor, hints, waivers, Entry::AfterDialogue)
                    }
                    Resolution::Superseded => Err(WardenError::Other(anyhow::anyhow!(
                        "session {} was superseded",
                        session.id
                    ))),
                }
            }
        }
    }

    /// Re-evaluate a corrected request and continue, restart, or close its session.
    fn reconsider(&self, session_id: SessionId, request: ActionRequest) -> warden_core::Result<Next> {
        let previous_id = request.supersedes();
        let mut ctx = self.context(Vec::new());
        // The request under correction does not count against itself.
        if previous_id.is_some_and(|id| self.backlog.get(id).is_some()) {
            ctx.unresolved_flags = ctx.unresolved_flags.saturating_sub(1);
        }
        let verdict = match self.gate.evaluate(&request, &ctx) {
            Ok(verdict) => verdict,
            Err(e) => {
                // Track the revision under its own id so a cancel can still mark it.
                if let Some(mut pending) = previous_id.and_then(|id| self.backlog.resolve(id)) {
                    pending.request = request;
                    self.backlog.insert(pending);
                }
                warn!(session_id = %session_id, error = %e, "corrected request not evaluated; session only accepts cancel");
                return Err(e);
            }
        };
        let hints = request_hints(previous_id.and_then(|id| self.backlog.resolve(id)), self.hints);

        if verdict.is_lockout() {
            self.dialogue
                .close(session_id, Resolution::Superseded, "corrected request is locked out")?;
            return Ok(Next::Reply(self.lock_out(request, &verdict, hints)));
        }
        if verdict.outcome() == Outcome::Allow {
            self.dialogue
                .close(session_id, Resolution::Superseded, "corrected request allowed")?;
            return Ok(Next::Execute(request, verdict, hints));
        }

        self.backlog.insert(PendingRequest::new(
            request,
            PendingReason::InDialogue,
            &verdict,
            hints,
        ));
        let step = self.dialogue.restart(session_id, verdict, &self.gate)?;
        self.follow(step)
    }

    async fn finish(&self, next: Next) -> warden_core::Result<Submission> {
        match next {
            Next::Reply(submission) => Ok(submission),
            Next::Execute(request, verdict, hints) => self.execute(request, &verdict, hints).await,
        }
    }

    async fn execute(
        &self,
        request: ActionRequest,
        verdict: &PolicyVerdict,
        hints: ExecutionHints,
    ) -> warden_core::Result<Submission> {
        let profile = hints.profile(request.id());
        let budget = self.ledger.budget();
        let dispatch = match self
            .dispatcher
            .dispatch(&profile, &budget, request.description())
            .await
        {
            Ok(dispatch) => dispatch,
            Err(e) => {
                warn!(request_id = %request.id(), kind = ?e.kind(), error = %e, "request not executed");
                return Err(e);
            }
        };

        let memo = format!("{} via {}", request.description(), dispatch.decision.backend_id);
        let transaction = self.ledger.charge(request.id(), dispatch.actual_cost, &memo)?;
        if let Err(e) = self.reevaluate_hierarchy() {
            error!(request_id = %request.id(), error = %e, "hierarchy re-evaluation failed");
        }

        Ok(Submission::Completed(Box::new(Execution {
            request,
            outcome: verdict.outcome(),
            dispatch,
            transaction,
        })))
    }
}

fn request_hints(pending: Option<PendingRequest>, fallback: ExecutionHints) -> ExecutionHints {
    pending.map_or(fallback, |p| p.hints)
}
