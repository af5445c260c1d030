//! # warden-policy
//!
//! The governance half of Warden: the mandate rules and the policy gate that
//! applies them, the dialogue engine that surfaces disagreement with the
//! operator, and the needs hierarchy that decides which background work is
//! permitted.

pub mod dialogue;
pub mod gate;
pub mod hierarchy;
pub mod rules;

pub use dialogue::{
    Alternative, DialogueEngine, DialogueSession, DialogueStep, OperatorInput, Resolution, Speaker,
    Turn,
};
pub use gate::{GateContext, PolicyGate, PolicyVerdict, TriggeredRule, Waiver, WaiverAuthority};
pub use hierarchy::{HierarchyManager, Signals, Thresholds, TierEvaluation};
pub use rules::{BudgetPrudenceRule, KeywordRule, MandateRule, RiskBacklogRule, default_rules, rules_from_config};
