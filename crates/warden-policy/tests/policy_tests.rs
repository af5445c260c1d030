#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use warden_core::*;
    use warden_policy::*;

    fn gate_with_defaults(journal: Arc<MemoryJournal>) -> PolicyGate {
        PolicyGate::from_config(&warden_config::GateConfig::default(), journal)
    }

    fn healthy_ctx() -> GateContext {
        GateContext {
            balance: 100.0,
            floor: 10.0,
            ..GateContext::default()
        }
    }

    struct FaultyRule;

    impl MandateRule for FaultyRule {
        fn name(&self) -> &str {
            "faulty"
        }
        fn severity(&self) -> Severity {
            Severity::Caution
        }
        fn evaluate(&self, _: &ActionRequest, _: &GateContext) -> Result<Option<String>> {
            Err(WardenError::Other(anyhow::anyhow!("sensor offline")))
        }
    }

    struct PanickyRule;

    impl MandateRule for PanickyRule {
        fn name(&self) -> &str {
            "panicky"
        }
        fn severity(&self) -> Severity {
            Severity::Caution
        }
        fn evaluate(&self, _: &ActionRequest, _: &GateContext) -> Result<Option<String>> {
            panic!("rule bug")
        }
    }

    /// Journal whose appends always fail.
    struct BrokenJournal;

    impl Journal for BrokenJournal {
        fn append(&self, _: JournalRecord) -> Result<()> {
            Err(WardenError::store("disk full"))
        }
        fn actions(&self, _: usize) -> Result<Vec<ActionRecord>> {
            Ok(vec![])
        }
        fn transactions(&self, _: usize) -> Result<Vec<Transaction>> {
            Ok(vec![])
        }
        fn dialogue(&self, _: Option<SessionId>, _: usize) -> Result<Vec<DialogueTurnRecord>> {
            Ok(vec![])
        }
        fn tier_history(&self, _: usize) -> Result<Vec<TierRecord>> {
            Ok(vec![])
        }
        fn tasks(&self) -> Result<Vec<TaskRecord>> {
            Ok(vec![])
        }
        fn task_runs(&self, _: usize) -> Result<Vec<TaskRunRecord>> {
            Ok(vec![])
        }
    }

    // ── Rules ──────────────────────────────────────────────────

    mod rules {
        use super::*;

        #[test]
        fn test_keyword_rule_matches_whole_words() {
            let rule = KeywordRule::new("harm", Severity::Catastrophic, ["harm"]);
            let ctx = GateContext::default();
            assert!(rule.evaluate(&ActionRequest::operator("harm the server"), &ctx).unwrap().is_some());
            assert!(rule.evaluate(&ActionRequest::operator("a harmless query"), &ctx).unwrap().is_none());
            assert!(rule.evaluate(&ActionRequest::operator("HARM!"), &ctx).unwrap().is_some());
        }

        #[test]
        fn test_keyword_rule_unless() {
            let rule = KeywordRule::new("destructive", Severity::Critical, ["delete"]).unless(["backup"]);
            let ctx = GateContext::default();
            assert!(rule.evaluate(&ActionRequest::operator("delete old logs"), &ctx).unwrap().is_some());
            assert!(
                rule.evaluate(&ActionRequest::operator("take a backup then delete old logs"), &ctx)
                    .unwrap()
                    .is_none()
            );
        }

        #[test]
        fn test_budget_prudence() {
            let req = ActionRequest::operator("summarize");
            let low = GateContext {
                balance: 5.0,
                floor: 10.0,
                ..GateContext::default()
            };
            assert!(BudgetPrudenceRule.evaluate(&req, &low).unwrap().is_some());
            assert!(BudgetPrudenceRule.evaluate(&req, &healthy_ctx()).unwrap().is_none());
        }

        #[test]
        fn test_risk_backlog() {
            let rule = RiskBacklogRule { limit: 2 };
            let req = ActionRequest::operator("summarize");
            let busy = GateContext {
                unresolved_flags: 3,
                ..healthy_ctx()
            };
            assert!(rule.evaluate(&req, &busy).unwrap().is_some());
            assert!(rule.evaluate(&req, &healthy_ctx()).unwrap().is_none());
        }

        #[test]
        fn test_config_rules_follow_builtins() {
            let mut cfg = warden_config::GateConfig::default();
            cfg.rules.push(warden_config::RuleConfig {
                name: "no_prod".into(),
                severity: Severity::Critical,
                keywords: vec!["production".into()],
                unless: vec![],
                alternative: None,
            });
            let rules = rules_from_config(&cfg);
            assert_eq!(rules.first().map(|r| r.name()), Some("non_maleficence.harm"));
            assert_eq!(rules.last().map(|r| r.name()), Some("no_prod"));

            cfg.builtin_rules = false;
            assert_eq!(rules_from_config(&cfg).len(), 1);
        }
    }

    // ── Policy gate ────────────────────────────────────────────

    mod gate {
        use super::*;

        #[test]
        fn test_no_match_allows() {
            let journal = Arc::new(MemoryJournal::new());
            let gate = gate_with_defaults(journal.clone());
            let req = ActionRequest::operator("summarize today's logs");
            let verdict = gate.evaluate(&req, &healthy_ctx()).unwrap();
            assert_eq!(verdict.outcome(), Outcome::Allow);
            assert!(verdict.triggered().is_empty());
            assert_eq!(verdict.request_id(), req.id());
        }

        #[test]
        fn test_caution_flags() {
            let journal = Arc::new(MemoryJournal::new());
            let gate = gate_with_defaults(journal);
            let ctx = GateContext {
                balance: 1.0,
                floor: 10.0,
                ..GateContext::default()
            };
            let verdict = gate.evaluate(&ActionRequest::operator("summarize"), &ctx).unwrap();
            assert_eq!(verdict.outcome(), Outcome::Flag);
            assert!(!verdict.is_lockout());
        }

        #[test]
        fn test_critical_blocks_without_lockout() {
            let journal = Arc::new(MemoryJournal::new());
            let gate = gate_with_defaults(journal);
            let verdict = gate
                .evaluate(&ActionRequest::operator("delete the staging database"), &healthy_ctx())
                .unwrap();
            assert_eq!(verdict.outcome(), Outcome::Block);
            assert_eq!(verdict.max_severity(), Some(Severity::Critical));
            assert!(!verdict.is_lockout());
            assert_eq!(verdict.overridable().len(), 1);
        }

        #[test]
        fn test_catastrophic_short_circuits() {
            let journal = Arc::new(MemoryJournal::new());
            let mut gate = PolicyGate::new(journal);
            gate.add_rule(Box::new(KeywordRule::new("harm", Severity::Catastrophic, ["harm"])));
            gate.add_rule(Box::new(PanickyRule));
            let verdict = gate.evaluate(&ActionRequest::operator("harm the operator"), &healthy_ctx()).unwrap();
            assert_eq!(verdict.outcome(), Outcome::Block);
            assert!(verdict.is_lockout());
            assert!(verdict.fault().is_none(), "later rules must not run");
            assert_eq!(verdict.lockout_rules(), vec!["harm".to_string()]);
        }

        #[test]
        fn test_rule_error_fails_closed() {
            let journal = Arc::new(MemoryJournal::new());
            let mut gate = PolicyGate::new(journal.clone());
            gate.add_rule(Box::new(FaultyRule));
            let verdict = gate.evaluate(&ActionRequest::operator("anything"), &healthy_ctx()).unwrap();
            assert_eq!(verdict.outcome(), Outcome::Block);
            assert!(verdict.is_lockout());
            assert!(verdict.fault().unwrap().contains("sensor offline"));
            assert_eq!(verdict.lockout_rules(), vec!["faulty".to_string()]);
            // the fault is in the audit log
            let actions = journal.actions(10).unwrap();
            assert!(actions[0].rationale.contains("fail-closed"));
        }

        #[test]
        fn test_rule_panic_fails_closed() {
            let journal = Arc::new(MemoryJournal::new());
            let mut gate = PolicyGate::new(journal);
            gate.add_rule(Box::new(PanickyRule));
            let verdict = gate.evaluate(&ActionRequest::operator("anything"), &healthy_ctx()).unwrap();
            assert_eq!(verdict.outcome(), Outcome::Block);
            assert!(verdict.fault().unwrap().contains("rule bug"));
        }

        #[test]
        fn test_acknowledged_fault_passes() {
            let journal = Arc::new(MemoryJournal::new());
            let mut gate = PolicyGate::new(journal);
            gate.add_rule(Box::new(FaultyRule));
            let ctx = healthy_ctx().with_waivers(vec![Waiver {
                rule: "faulty".into(),
                authority: WaiverAuthority::RiskAcknowledgment,
            }]);
            let verdict = gate.evaluate(&ActionRequest::operator("anything"), &ctx).unwrap();
            assert_eq!(verdict.outcome(), Outcome::Allow);
            assert!(verdict.triggered()[0].waived);
        }

        #[test]
        fn test_every_verdict_is_audited() {
            let journal = Arc::new(MemoryJournal::new());
            let gate = gate_with_defaults(journal.clone());
            let a = ActionRequest::operator("summarize");
            let b = ActionRequest::operator("harm everyone").urgent();
            gate.evaluate(&a, &healthy_ctx()).unwrap();
            gate.evaluate(&b, &healthy_ctx()).unwrap();
            let actions = journal.actions(10).unwrap();
            assert_eq!(actions.len(), 2);
            assert_eq!(actions[0].request_id, a.id());
            assert_eq!(actions[0].outcome, Outcome::Allow);
            assert_eq!(actions[1].request_id, b.id());
            assert!(actions[1].urgent);
            assert_eq!(actions[1].outcome, Outcome::Block);
        }

        #[test]
        fn test_audit_failure_returns_no_verdict() {
            let gate = PolicyGate::from_config(&warden_config::GateConfig::default(), Arc::new(BrokenJournal));
            let err = gate.evaluate(&ActionRequest::operator("summarize"), &healthy_ctx()).unwrap_err();
            assert!(matches!(err, WardenError::Audit(_)));
        }

        #[test]
        fn test_override_waives_critical_only() {
            let journal = Arc::new(MemoryJournal::new());
            let gate = gate_with_defaults(journal);
            let waive = |rule: &str| Waiver {
                rule: rule.into(),
                authority: WaiverAuthority::OperatorOverride,
            };

            let ctx = healthy_ctx().with_waivers(vec![waive("non_maleficence.destructive")]);
            let verdict = gate.evaluate(&ActionRequest::operator("delete the cache"), &ctx).unwrap();
            assert_eq!(verdict.outcome(), Outcome::Allow);
            assert!(verdict.triggered()[0].waived);
            assert!(verdict.rationale().contains("[waived]"));

            let ctx = healthy_ctx().with_waivers(vec![waive("non_maleficence.harm")]);
            let verdict = gate.evaluate(&ActionRequest::operator("harm the cache"), &ctx).unwrap();
            assert_eq!(verdict.outcome(), Outcome::Block);
            assert!(verdict.is_lockout());
        }

        #[test]
        fn test_risk_acknowledgment_waives_catastrophic() {
            let journal = Arc::new(MemoryJournal::new());
            let gate = gate_with_defaults(journal);
            let ctx = healthy_ctx().with_waivers(vec![Waiver {
                rule: "non_maleficence.harm".into(),
                authority: WaiverAuthority::RiskAcknowledgment,
            }]);
            let verdict = gate.evaluate(&ActionRequest::operator("run the harm simulation"), &ctx).unwrap();
            assert_eq!(verdict.outcome(), Outcome::Allow);
            assert!(!verdict.is_lockout());
        }
    }

    // ── Dialogue ───────────────────────────────────────────────

    mod dialogue {
        use super::*;

        fn flagged(journal: Arc<MemoryJournal>) -> (PolicyGate, ActionRequest, PolicyVerdict) {
            let gate = gate_with_defaults(journal);
            let ctx = GateContext {
                balance: 1.0,
                floor: 10.0,
                ..GateContext::default()
            };
            let req = ActionRequest::operator("draft the quarterly report");
            let verdict = gate.evaluate(&req, &ctx).unwrap();
            assert_eq!(verdict.outcome(), Outcome::Flag);
            (gate, req, verdict)
        }

        fn session_id(step: &DialogueStep) -> SessionId {
            match step {
                DialogueStep::Prompt { session_id, .. } => *session_id,
                other => panic!("expected prompt, got {other:?}"),
            }
        }

        #[test]
        fn test_four_acks_resolve_in_order() {
            let journal = Arc::new(MemoryJournal::new());
            let (gate, req, verdict) = flagged(journal.clone());
            let engine = DialogueEngine::new(journal.clone());
            let step = engine.open(req, verdict, &gate).unwrap();
            let id = session_id(&step);

            let mut stages = vec![DialogueStage::Understanding];
            for _ in 0..3 {
                match engine.respond(id, OperatorInput::Acknowledge).unwrap() {
                    DialogueStep::Prompt { stage, .. } => stages.push(stage),
                    other => panic!("unexpected {other:?}"),
                }
            }
            match engine.respond(id, OperatorInput::Acknowledge).unwrap() {
                DialogueStep::Resolved { session, resolution } => {
                    stages.push(session.stage);
                    assert_eq!(resolution, Resolution::Accepted);
                    assert!(!session.transcript.is_empty());
                }
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(
                stages,
                vec![
                    DialogueStage::Understanding,
                    DialogueStage::RiskIdentification,
                    DialogueStage::Alternative,
                    DialogueStage::Recommendation,
                    DialogueStage::Resolved,
                ]
            );
            assert!(engine.session(id).is_none(), "resolved sessions are archived");
            assert!(journal.dialogue(Some(id), 100).unwrap().len() >= 9);
        }

        #[test]
        fn test_alternatives_are_offered() {
            let journal = Arc::new(MemoryJournal::new());
            let (gate, req, verdict) = flagged(journal.clone());
            let engine = DialogueEngine::new(journal);
            let id = session_id(&engine.open(req, verdict, &gate).unwrap());
            let session = engine.session(id).unwrap();
            assert!(session.alternatives.len() >= 2);
            assert!(session.alternatives.iter().all(|a| !a.benefit.is_empty() && !a.risk.is_empty()));
        }

        #[test]
        fn test_accept_only_at_recommendation() {
            let journal = Arc::new(MemoryJournal::new());
            let (gate, req, verdict) = flagged(journal.clone());
            let engine = DialogueEngine::new(journal);
            let id = session_id(&engine.open(req, verdict, &gate).unwrap());
            let err = engine.respond(id, OperatorInput::Accept).unwrap_err();
            assert!(matches!(err, WardenError::InvalidTransition { .. }));
            let err = engine.respond(id, OperatorInput::Override).unwrap_err();
            assert!(matches!(err, WardenError::InvalidTransition { .. }));
        }

        #[test]
        fn test_correction_restarts_with_successor() {
            let journal = Arc::new(MemoryJournal::new());
            let (gate, req, verdict) = flagged(journal.clone());
            let original = req.id();
            let engine = DialogueEngine::new(journal);
            let id = session_id(&engine.open(req, verdict, &gate).unwrap());
            engine.respond(id, OperatorInput::Acknowledge).unwrap();

            let revised = match engine.respond(id, OperatorInput::Correct("draft a short summary".into())).unwrap() {
                DialogueStep::Revised { request, .. } => request,
                other => panic!("unexpected {other:?}"),
            };
            assert_eq!(revised.supersedes(), Some(original));
            assert_eq!(revised.description(), "draft a short summary");

            // no input until the corrected request is re-checked
            assert!(engine.respond(id, OperatorInput::Acknowledge).is_err());

            let ctx = GateContext {
                balance: 1.0,
                floor: 10.0,
                ..GateContext::default()
            };
            let verdict = gate.evaluate(&revised, &ctx).unwrap();
            match engine.restart(id, verdict, &gate).unwrap() {
                DialogueStep::Prompt { stage, text, .. } => {
                    assert_eq!(stage, DialogueStage::Understanding);
                    assert!(text.contains("draft a short summary"));
                }
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(engine.session(id).unwrap().restarts, 1);
        }

        #[test]
        fn test_cancel_accepted_before_reevaluation() {
            let journal = Arc::new(MemoryJournal::new());
            let (gate, req, verdict) = flagged(journal.clone());
            let engine = DialogueEngine::new(journal);
            let id = session_id(&engine.open(req, verdict, &gate).unwrap());
            engine
                .respond(id, OperatorInput::Correct("draft a short summary".into()))
                .unwrap();
            let err = engine.respond(id, OperatorInput::Cancel).unwrap_err();
            assert!(matches!(err, WardenError::SessionAborted { .. }));
            assert!(engine.session(id).is_none());
        }

        #[test]
        fn test_cancel_aborts() {
            let journal = Arc::new(MemoryJournal::new());
            let (gate, req, verdict) = flagged(journal.clone());
            let request_id = req.id();
            let engine = DialogueEngine::new(journal);
            let id = session_id(&engine.open(req, verdict, &gate).unwrap());
            match engine.respond(id, OperatorInput::Cancel).unwrap_err() {
                WardenError::SessionAborted { session_id, request_id: rid } => {
                    assert_eq!(session_id, id);
                    assert_eq!(rid, request_id);
                }
                other => panic!("unexpected {other:?}"),
            }
            assert!(engine.open_sessions().is_empty());
        }

        #[test]
        fn test_override_waives_blocking_rules() {
            let journal = Arc::new(MemoryJournal::new());
            let gate = gate_with_defaults(journal.clone());
            let req = ActionRequest::operator("delete the temp directory");
            let verdict = gate.evaluate(&req, &healthy_ctx()).unwrap();
            let engine = DialogueEngine::new(journal);
            let id = session_id(&engine.open(req, verdict, &gate).unwrap());
            for _ in 0..3 {
                engine.respond(id, OperatorInput::Acknowledge).unwrap();
            }
            match engine.respond(id, OperatorInput::Override).unwrap() {
                DialogueStep::Resolved {
                    resolution: Resolution::Overridden { waivers },
                    ..
                } => {
                    assert_eq!(waivers.len(), 1);
                    assert_eq!(waivers[0].rule, "non_maleficence.destructive");
                    assert_eq!(waivers[0].authority, WaiverAuthority::OperatorOverride);
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn test_lockout_never_opens_session() {
            let journal = Arc::new(MemoryJournal::new());
            let gate = gate_with_defaults(journal.clone());
            let req = ActionRequest::operator("sabotage the backups");
            let verdict = gate.evaluate(&req, &healthy_ctx()).unwrap();
            let engine = DialogueEngine::new(journal);
            let err = engine.open(req, verdict, &gate).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SafetyLockout);
            assert!(engine.open_sessions().is_empty());
        }

        #[test]
        fn test_parse_operator_input() {
            assert_eq!(OperatorInput::parse("ack"), Some(OperatorInput::Acknowledge));
            assert_eq!(OperatorInput::parse("  Accept "), Some(OperatorInput::Accept));
            assert_eq!(
                OperatorInput::parse("correct only the cache"),
                Some(OperatorInput::Correct("only the cache".into()))
            );
            assert_eq!(OperatorInput::parse("correct"), None);
            assert_eq!(OperatorInput::parse("dance"), None);
        }
    }

    // ── Needs hierarchy ────────────────────────────────────────

    mod hierarchy {
        use super::*;
        use chrono::{Duration, Utc};

        fn thriving(at: chrono::DateTime<Utc>) -> Signals {
            Signals {
                resource_health: 0.9,
                balance: 200.0,
                balance_trend: 5.0,
                error_rate: 0.0,
                unresolved_flags: 0,
                observed_at: at,
            }
        }

        fn no_window() -> Thresholds {
            Thresholds {
                promotion_window: std::time::Duration::ZERO,
                ..Thresholds::default()
            }
        }

        #[test]
        fn test_starts_physiological_and_records_it() {
            let journal = Arc::new(MemoryJournal::new());
            let manager = HierarchyManager::new(Thresholds::default(), journal.clone()).unwrap();
            assert_eq!(manager.current_tier(), NeedsTier::Physiological);
            let history = journal.tier_history(10).unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].tier, NeedsTier::Physiological);
        }

        #[test]
        fn test_promotion_is_one_tier_per_call() {
            let journal = Arc::new(MemoryJournal::new());
            let manager = HierarchyManager::new(no_window(), journal).unwrap();
            let t0 = Utc::now();
            let mut tiers = vec![];
            for i in 0..5 {
                let eval = manager.reevaluate(&thriving(t0 + Duration::seconds(i))).unwrap();
                assert!(eval.current.as_u8() <= eval.previous.as_u8() + 1);
                tiers.push(eval.current);
            }
            assert_eq!(
                tiers,
                vec![
                    NeedsTier::Growth,
                    NeedsTier::Cognitive,
                    NeedsTier::SelfActualization,
                    NeedsTier::SelfActualization,
                    NeedsTier::SelfActualization,
                ]
            );
        }

        #[test]
        fn test_promotion_waits_for_window() {
            let journal = Arc::new(MemoryJournal::new());
            let thresholds = Thresholds {
                promotion_window: std::time::Duration::from_secs(60),
                ..Thresholds::default()
            };
            let manager = HierarchyManager::new(thresholds, journal).unwrap();
            let t0 = Utc::now();
            assert!(!manager.reevaluate(&thriving(t0)).unwrap().changed());
            assert!(!manager.reevaluate(&thriving(t0 + Duration::seconds(30))).unwrap().changed());
            let eval = manager.reevaluate(&thriving(t0 + Duration::seconds(61))).unwrap();
            assert!(eval.promoted());
            assert_eq!(eval.current, NeedsTier::Growth);
        }

        #[test]
        fn test_instability_resets_window() {
            let journal = Arc::new(MemoryJournal::new());
            let thresholds = Thresholds {
                promotion_window: std::time::Duration::from_secs(60),
                ..Thresholds::default()
            };
            let manager = HierarchyManager::new(thresholds, journal).unwrap();
            let t0 = Utc::now();
            manager.reevaluate(&thriving(t0)).unwrap();
            let mut poor = thriving(t0 + Duration::seconds(30));
            poor.balance = 10.0;
            manager.reevaluate(&poor).unwrap();
            let eval = manager.reevaluate(&thriving(t0 + Duration::seconds(70))).unwrap();
            assert!(!eval.changed(), "window restarts after an unstable observation");
        }

        #[test]
        fn test_growth_entry_needs_non_negative_trend() {
            let journal = Arc::new(MemoryJournal::new());
            let manager = HierarchyManager::new(no_window(), journal).unwrap();
            let mut s = thriving(Utc::now());
            s.balance_trend = -1.0;
            assert_eq!(manager.reevaluate(&s).unwrap().current, NeedsTier::Physiological);
        }

        #[test]
        fn test_demotion_can_drop_several_tiers() {
            let journal = Arc::new(MemoryJournal::new());
            let manager = HierarchyManager::new(no_window(), journal.clone()).unwrap();
            let t0 = Utc::now();
            for i in 0..3 {
                manager.reevaluate(&thriving(t0 + Duration::seconds(i))).unwrap();
            }
            assert_eq!(manager.current_tier(), NeedsTier::SelfActualization);

            let mut broke = thriving(t0 + Duration::seconds(10));
            broke.balance = 5.0;
            let eval = manager.reevaluate(&broke).unwrap();
            assert!(eval.demoted());
            assert_eq!(eval.current, NeedsTier::Physiological);

            let history = journal.tier_history(10).unwrap();
            assert_eq!(history.last().unwrap().tier, NeedsTier::Physiological);
            assert!(history.last().unwrap().exited_at.is_none());
        }

        #[test]
        fn test_demotion_falls_below_lowest_failing_tier() {
            let journal = Arc::new(MemoryJournal::new());
            let manager = HierarchyManager::new(no_window(), journal).unwrap();
            let t0 = Utc::now();
            for i in 0..3 {
                manager.reevaluate(&thriving(t0 + Duration::seconds(i))).unwrap();
            }
            let mut errors = thriving(t0 + Duration::seconds(10));
            errors.error_rate = 0.9;
            assert_eq!(manager.reevaluate(&errors).unwrap().current, NeedsTier::Physiological);

            let manager = HierarchyManager::new(no_window(), Arc::new(MemoryJournal::new())).unwrap();
            for i in 0..3 {
                manager.reevaluate(&thriving(t0 + Duration::seconds(i))).unwrap();
            }
            let mut flags = thriving(t0 + Duration::seconds(10));
            flags.unresolved_flags = 10;
            assert_eq!(manager.reevaluate(&flags).unwrap().current, NeedsTier::Growth);
        }

        #[test]
        fn test_reevaluate_is_idempotent_per_observation() {
            let journal = Arc::new(MemoryJournal::new());
            let manager = HierarchyManager::new(no_window(), journal).unwrap();
            let s = thriving(Utc::now());
            assert!(manager.reevaluate(&s).unwrap().promoted());
            assert!(!manager.reevaluate(&s).unwrap().changed());
            assert_eq!(manager.current_tier(), NeedsTier::Growth);
        }

        #[test]
        fn test_restores_tier_from_journal() {
            let journal = Arc::new(MemoryJournal::new());
            {
                let manager = HierarchyManager::new(no_window(), journal.clone()).unwrap();
                manager.reevaluate(&thriving(Utc::now())).unwrap();
            }
            let manager = HierarchyManager::new(no_window(), journal).unwrap();
            assert_eq!(manager.current_tier(), NeedsTier::Growth);
        }
    }
}
