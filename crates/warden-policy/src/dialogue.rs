use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::{
    ActionRequest, DialogueStage, DialogueTurnRecord, Journal, JournalRecord, Outcome, SessionId,
    WardenError,
};

use crate::gate::{PolicyGate, PolicyVerdict, Waiver};

/// Operator input to a dialogue session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum OperatorInput {
    /// Confirm the current stage and move to the next one.
    Acknowledge,
    /// Replace the request text; the session restarts at Understanding.
    Correct(String),
    /// Accept the recommendation; the request goes back to the gate.
    Accept,
    /// Final override of non-catastrophic rules.
    Override,
    /// Abandon the session; the request stays unresolved.
    Cancel,
}

impl OperatorInput {
    /// Parse console input: `ack`, `accept`, `override`, `cancel`, `correct <text>`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (line, ""),
        };
        match word.to_lowercase().as_str() {
            "ack" | "acknowledge" | "ok" | "y" | "yes" => Some(Self::Acknowledge),
            "accept" => Some(Self::Accept),
            "override" => Some(Self::Override),
            "cancel" | "abort" | "quit" => Some(Self::Cancel),
            "correct" | "no" if !rest.is_empty() => Some(Self::Correct(rest.to_string())),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Acknowledge => "acknowledged".into(),
            Self::Correct(text) => format!("correction: {}", text),
            Self::Accept => "accepted the recommendation".into(),
            Self::Override => "issued a final override".into(),
            Self::Cancel => "cancelled the session".into(),
        }
    }
}

/// Candidate action proposed at the Alternative stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub action: String,
    pub benefit: String,
    pub risk: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Agent,
    Operator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub stage: DialogueStage,
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// A dialogue about one flagged or blocked request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueSession {
    pub id: SessionId,
    pub request: ActionRequest,
    pub verdict: PolicyVerdict,
    pub stage: DialogueStage,
    pub alternatives: Vec<Alternative>,
    pub transcript: Vec<Turn>,
    /// Number of corrections so far.
    pub restarts: u32,
    /// Set after a correction until the revised request has been re-evaluated.
    pub awaiting_reevaluation: bool,
    pub opened_at: DateTime<Utc>,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// The recommendation was accepted; the request returns to the gate as is.
    Accepted,
    /// The operator overrode these non-catastrophic rules.
    Overridden { waivers: Vec<Waiver> },
    /// A correction produced a request the gate no longer objects to.
    Superseded,
}

/// What the engine wants the caller to do next.
#[derive(Debug, Clone)]
pub enum DialogueStep {
    /// Show `text` to the operator and wait for input.
    Prompt {
        session_id: SessionId,
        stage: DialogueStage,
        text: String,
    },
    /// The operator corrected the request. Re-evaluate `request` and call
    /// [`DialogueEngine::restart`] (or [`DialogueEngine::close`]).
    Revised {
        session_id: SessionId,
        request: ActionRequest,
    },
    /// The session reached Resolved and has been archived.
    Resolved {
        session: Box<DialogueSession>,
        resolution: Resolution,
    },
}

/// Four-stage disagreement protocol between the gate's findings and the operator.
///
/// Sessions advance only on explicit operator input. Every turn is appended to
/// the journal's `dialogue_log` as it happens.
pub struct DialogueEngine {
    sessions: Mutex<HashMap<SessionId, DialogueSession>>,
    journal: Arc<dyn Journal>,
}

impl DialogueEngine {
    pub fn new(journal: Arc<dyn Journal>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            journal,
        }
    }

    /// Open a session for a flagged or blocked request. Lock-outs are refused.
    pub fn open(
        &self,
        request: ActionRequest,
        verdict: PolicyVerdict,
        gate: &PolicyGate,
    ) -> warden_core::Result<DialogueStep> {
        if verdict.is_lockout() {
            return Err(WardenError::SafetyLockout {
                request_id: verdict.request_id(),
                rules: verdict.lockout_rules(),
            });
        }
        if verdict.outcome() == Outcome::Allow {
            return Err(WardenError::Other(anyhow::anyhow!(
                "request {} was allowed; nothing to discuss",
                verdict.request_id()
            )));
        }

        let now = Utc::now();
        let mut session = DialogueSession {
            id: Uuid::new_v4(),
            alternatives: alternatives_for(&request, &verdict, gate),
            request,
            verdict,
            stage: DialogueStage::Understanding,
            transcript: Vec::new(),
            restarts: 0,
            awaiting_reevaluation: false,
            opened_at: now,
        };
        info!(
            session_id = %session.id,
            request_id = %session.request.id(),
            outcome = session.verdict.outcome().as_str(),
            "dialogue session opened"
        );

        let text = stage_prompt(&session);
        self.record(&mut session, Speaker::Agent, text.clone())?;
        let step = DialogueStep::Prompt {
            session_id: session.id,
            stage: session.stage,
            text,
        };
        self.sessions.lock().insert(session.id, session);
        Ok(step)
    }

    /// Apply one operator input to a session.
    pub fn respond(&self, session_id: SessionId, input: OperatorInput) -> warden_core::Result<DialogueStep> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(&session_id)
            .ok_or(WardenError::SessionNotFound(session_id))?;

        // A correction that could not be re-evaluated only accepts a cancel.
        if session.awaiting_reevaluation && !matches!(input, OperatorInput::Cancel) {
            return Err(WardenError::InvalidTransition {
                stage: session.stage,
                input: "any input but cancel before the corrected request is re-evaluated".into(),
            });
        }

        match input {
            OperatorInput::Cancel => {
                self.record(session, Speaker::Operator, input.describe())?;
                let request_id = session.request.id();
                sessions.remove(&session_id);
                warn!(session_id = %session_id, request_id = %request_id, "dialogue session cancelled");
                Err(WardenError::SessionAborted {
                    session_id,
                    request_id,
                })
            }
            OperatorInput::Correct(ref text) => {
                self.record(session, Speaker::Operator, input.describe())?;
                session.request = session.request.revised(text.clone());
                session.stage = DialogueStage::Understanding;
                session.restarts += 1;
                session.awaiting_reevaluation = true;
                info!(
                    session_id = %session_id,
                    request_id = %session.request.id(),
                    restarts = session.restarts,
                    "dialogue restarted with corrected request"
                );
                Ok(DialogueStep::Revised {
                    session_id,
                    request: session.request.clone(),
                })
            }
            OperatorInput::Acknowledge if session.stage == DialogueStage::Recommendation => {
                self.record(session, Speaker::Operator, input.describe())?;
                self.resolve(&mut sessions, session_id, Resolution::Accepted)
            }
            OperatorInput::Acknowledge => {
                self.record(session, Speaker::Operator, input.describe())?;
                let Some(next) = session.stage.next() else {
                    return Err(WardenError::InvalidTransition {
                        stage: session.stage,
                        input: "ack".into(),
                    });
                };
                session.stage = next;
                let text = stage_prompt(session);
                self.record(session, Speaker::Agent, text.clone())?;
                debug!(session_id = %session_id, stage = %next, "dialogue advanced");
                Ok(DialogueStep::Prompt {
                    session_id,
                    stage: next,
                    text,
                })
            }
            OperatorInput::Accept | OperatorInput::Override
                if session.stage != DialogueStage::Recommendation =>
            {
                Err(WardenError::InvalidTransition {
                    stage: session.stage,
                    input: input.describe(),
                })
            }
            OperatorInput::Accept => {
                self.record(session, Speaker::Operator, input.describe())?;
                self.resolve(&mut sessions, session_id, Resolution::Accepted)
            }
            OperatorInput::Override => {
                if session.verdict.is_lockout() {
                    return Err(WardenError::SafetyLockout {
                        request_id: session.request.id(),
                        rules: session.verdict.lockout_rules(),
                    });
                }
                self.record(session, Speaker::Operator, input.describe())?;
                let waivers = session.verdict.overridable();
                self.resolve(&mut sessions, session_id, Resolution::Overridden { waivers })
            }
        }
    }

    /// Resume a corrected session with the gate's verdict on the revised request.
    pub fn restart(
        &self,
        session_id: SessionId,
        verdict: PolicyVerdict,
        gate: &PolicyGate,
    ) -> warden_core::Result<DialogueStep> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(&session_id)
            .ok_or(WardenError::SessionNotFound(session_id))?;
        if verdict.request_id() != session.request.id() {
            return Err(WardenError::Other(anyhow::anyhow!(
                "verdict for {} does not match session request {}",
                verdict.request_id(),
                session.request.id()
            )));
        }
        session.alternatives = alternatives_for(&session.request, &verdict, gate);
        session.verdict = verdict;
        session.awaiting_reevaluation = false;
        let text = stage_prompt(session);
        self.record(session, Speaker::Agent, text.clone())?;
        Ok(DialogueStep::Prompt {
            session_id,
            stage: session.stage,
            text,
        })
    }

    /// Archive a session without operator input (e.g. the corrected request was allowed
    /// or turned into a lock-out).
    pub fn close(&self, session_id: SessionId, resolution: Resolution, note: &str) -> warden_core::Result<DialogueStep> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(&session_id)
            .ok_or(WardenError::SessionNotFound(session_id))?;
        self.record(session, Speaker::Agent, note.to_string())?;
        self.resolve(&mut sessions, session_id, resolution)
    }

    /// Drop a session whose wait was cancelled. The request stays unresolved.
    pub fn abandon(&self, session_id: SessionId) -> warden_core::Result<WardenError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(&session_id)
            .ok_or(WardenError::SessionNotFound(session_id))?;
        self.record(session, Speaker::Agent, "session abandoned: wait cancelled".into())?;
        let request_id = session.request.id();
        sessions.remove(&session_id);
        warn!(session_id = %session_id, request_id = %request_id, "dialogue wait cancelled");
        Ok(WardenError::SessionAborted {
            session_id,
            request_id,
        })
    }

    pub fn session(&self, session_id: SessionId) -> Option<DialogueSession> {
        self.sessions.lock().get(&session_id).cloned()
    }

    pub fn open_sessions(&self) -> Vec<DialogueSession> {
        let mut open: Vec<_> = self.sessions.lock().values().cloned().collect();
        open.sort_by_key(|s| s.opened_at);
        open
    }

    fn resolve(
        &self,
        sessions: &mut HashMap<SessionId, DialogueSession>,
        session_id: SessionId,
        resolution: Resolution,
    ) -> warden_core::Result<DialogueStep> {
        let Some(mut session) = sessions.remove(&session_id) else {
            return Err(WardenError::SessionNotFound(session_id));
        };
        session.stage = DialogueStage::Resolved;
        let text = match &resolution {
            Resolution::Accepted => "resolved: recommendation accepted, re-checking the request".to_string(),
            Resolution::Overridden { waivers } => format!(
                "resolved: operator override waives {}",
                waivers.iter().map(|w| w.rule.as_str()).collect::<Vec<_>>().join(", ")
            ),
            Resolution::Superseded => "resolved: corrected request no longer needs discussion".to_string(),
        };
        if let Err(e) = self.record(&mut session, Speaker::Agent, text) {
            sessions.insert(session_id, session);
            return Err(e);
        }
        info!(session_id = %session_id, request_id = %session.request.id(), "dialogue session resolved");
        Ok(DialogueStep::Resolved {
            session: Box::new(session),
            resolution,
        })
    }

    fn record(&self, session: &mut DialogueSession, speaker: Speaker, text: String) -> warden_core::Result<()> {
        let turn = Turn {
            stage: session.stage,
            speaker,
            text,
            at: Utc::now(),
        };
        let who = match speaker {
            Speaker::Agent => "agent",
            Speaker::Operator => "operator",
        };
        self.journal.append(JournalRecord::Dialogue(DialogueTurnRecord {
            session_id: session.id,
            stage: turn.stage,
            turn_text: format!("{}: {}", who, turn.text),
            timestamp: turn.at,
        }))?;
        session.transcript.push(turn);
        Ok(())
    }
}

fn stage_prompt(session: &DialogueSession) -> String {
    let request = &session.request;
    let verdict = &session.verdict;
    match session.stage {
        DialogueStage::Understanding => format!(
            "I understand you want me to: \"{}\"{}. Is that right? (ack / correct <text> / cancel)",
            request.description(),
            if request.is_urgent() { " (urgent)" } else { "" }
        ),
        DialogueStage::RiskIdentification => {
            let mut text = String::from("Before proceeding, these mandates apply:");
            for t in verdict.active() {
                text.push_str(&format!("\n  - {} [{}]: {}", t.name, t.severity, t.reason));
            }
            text.push_str(&format!("\nRationale: {}", verdict.rationale()));
            text
        }
        DialogueStage::Alternative => {
            let mut text = String::from("Alternatives:");
            for (i, alt) in session.alternatives.iter().enumerate() {
                text.push_str(&format!(
                    "\n  {}. {}\n     benefit: {}\n     risk: {}",
                    i + 1,
                    alt.action,
                    alt.benefit,
                    alt.risk
                ));
            }
            text
        }
        DialogueStage::Recommendation => {
            let safer = session
                .alternatives
                .iter()
                .find(|a| a.action != request.description())
                .map(|a| a.action.as_str())
                .unwrap_or("defer the request");
            match verdict.outcome() {
                Outcome::Block => format!(
                    "I recommend not proceeding as requested. Consider instead: {}. \
                     (accept re-checks the request / override waives the blocking rules / correct <text> / cancel)",
                    safer
                ),
                _ => format!(
                    "I recommend proceeding with care; a safer path is: {}. \
                     (accept to proceed / override / correct <text> / cancel)",
                    safer
                ),
            }
        }
        DialogueStage::Resolved => "resolved".into(),
    }
}

fn alternatives_for(request: &ActionRequest, verdict: &PolicyVerdict, gate: &PolicyGate) -> Vec<Alternative> {
    let mut alternatives = Vec::new();
    for t in verdict.active() {
        if let Some(action) = gate.rule(&t.name).and_then(|r| r.alternative())
            && !alternatives.iter().any(|a: &Alternative| a.action == action)
        {
            alternatives.push(Alternative {
                action: action.to_string(),
                benefit: format!("avoids the {} risk flagged by {}", t.severity, t.name),
                risk: "may take longer or only partly achieve the original goal".into(),
            });
        }
    }
    let concerns: Vec<String> = verdict
        .active()
        .map(|t| format!("{} ({})", t.name, t.severity))
        .collect();
    alternatives.push(Alternative {
        action: request.description().to_string(),
        benefit: "achieves the goal exactly as stated".into(),
        risk: if concerns.is_empty() {
            "none identified".into()
        } else {
            format!("proceeds despite {}", concerns.join(", "))
        },
    });
    if alternatives.len() == 1 {
        alternatives.insert(
            0,
            Alternative {
                action: "Defer the request and revisit it later".into(),
                benefit: "no resources spent while the concern stands".into(),
                risk: "the goal is delayed".into(),
            },
        );
    }
    alternatives
}
