#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;
    use warden_core::*;

    // ── ActionRequest tests ────────────────────────────────────

    #[test]
    fn test_operator_request_defaults() {
        let req = ActionRequest::operator("summarize the logs");
        assert_eq!(req.description(), "summarize the logs");
        assert!(!req.is_urgent());
        assert_eq!(req.originator(), &Originator::Operator);
        assert!(req.supersedes().is_none());
    }

    #[test]
    fn test_urgent_builder() {
        let req = ActionRequest::operator("restart the service").urgent();
        assert!(req.is_urgent());
    }

    #[test]
    fn test_successor_gets_fresh_id_and_link() {
        let req = ActionRequest::operator("rotate keys").urgent();
        let next = req.successor();
        assert_ne!(next.id(), req.id());
        assert_eq!(next.supersedes(), Some(req.id()));
        assert_eq!(next.description(), req.description());
        assert!(next.is_urgent());
    }

    #[test]
    fn test_revised_changes_text_only() {
        let req = ActionRequest::new("clean tmp", Originator::Task { name: "janitor".into() });
        let next = req.revised("clean /tmp/cache only");
        assert_eq!(next.description(), "clean /tmp/cache only");
        assert_eq!(next.originator(), req.originator());
        assert_eq!(next.supersedes(), Some(req.id()));
    }

    // ── Severity / Outcome tests ───────────────────────────────

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Caution < Severity::Critical);
        assert!(Severity::Critical < Severity::Catastrophic);
    }

    #[test]
    fn test_outcome_from_severity() {
        assert_eq!(Outcome::from_severity(None), Outcome::Allow);
        assert_eq!(Outcome::from_severity(Some(Severity::Caution)), Outcome::Flag);
        assert_eq!(Outcome::from_severity(Some(Severity::Critical)), Outcome::Block);
        assert_eq!(Outcome::from_severity(Some(Severity::Catastrophic)), Outcome::Block);
    }

    #[test]
    fn test_outcome_parse() {
        for o in [Outcome::Allow, Outcome::Flag, Outcome::Block] {
            assert_eq!(Outcome::parse(o.as_str()), Some(o));
        }
        assert_eq!(Outcome::parse("maybe"), None);
    }

    // ── NeedsTier tests ────────────────────────────────────────

    #[test]
    fn test_tier_ordering() {
        assert!(NeedsTier::Physiological < NeedsTier::Growth);
        assert!(NeedsTier::Growth < NeedsTier::Cognitive);
        assert!(NeedsTier::Cognitive < NeedsTier::SelfActualization);
    }

    #[test]
    fn test_tier_next_prev() {
        assert_eq!(NeedsTier::Physiological.next(), Some(NeedsTier::Growth));
        assert_eq!(NeedsTier::SelfActualization.next(), None);
        assert_eq!(NeedsTier::Growth.prev(), Some(NeedsTier::Physiological));
        assert_eq!(NeedsTier::Physiological.prev(), None);
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!(NeedsTier::parse("growth"), Some(NeedsTier::Growth));
        assert_eq!(NeedsTier::parse("Self-Actualization"), Some(NeedsTier::SelfActualization));
        assert_eq!(NeedsTier::parse("3"), Some(NeedsTier::Cognitive));
        assert_eq!(NeedsTier::parse("0"), None);
        assert_eq!(NeedsTier::parse("nirvana"), None);
    }

    #[test]
    fn test_tier_display() {
        let s = NeedsTier::Cognitive.to_string();
        assert!(s.contains("T3"));
        assert!(s.contains("Cognitive"));
    }

    // ── DialogueStage tests ────────────────────────────────────

    #[test]
    fn test_stage_sequence() {
        let mut stage = DialogueStage::Understanding;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(
            seen,
            vec![
                DialogueStage::Understanding,
                DialogueStage::RiskIdentification,
                DialogueStage::Alternative,
                DialogueStage::Recommendation,
                DialogueStage::Resolved,
            ]
        );
    }

    // ── Error tests ────────────────────────────────────────────

    #[test]
    fn test_error_kinds() {
        let id = Uuid::new_v4();
        assert_eq!(
            WardenError::PolicyViolation { request_id: id, rationale: "x".into() }.kind(),
            ErrorKind::PolicyViolation
        );
        assert_eq!(
            WardenError::NoEligibleBackend { request_id: id, reason: "x".into() }.kind(),
            ErrorKind::BudgetExceeded
        );
        assert_eq!(
            WardenError::BackendFault { backend: "b".into(), reason: "x".into() }.kind(),
            ErrorKind::BackendFault
        );
        assert_eq!(
            WardenError::SessionAborted { session_id: id, request_id: id }.kind(),
            ErrorKind::SessionAborted
        );
        assert_eq!(
            WardenError::SafetyLockout { request_id: id, rules: vec![] }.kind(),
            ErrorKind::SafetyLockout
        );
        assert_eq!(WardenError::Store("disk".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_error_display() {
        let err = WardenError::SafetyLockout {
            request_id: Uuid::nil(),
            rules: vec!["non_maleficence.harm".into()],
        };
        let s = err.to_string();
        assert!(s.contains("non_maleficence.harm"));
        assert!(s.contains("risk acknowledgment"));
    }

    // ── MemoryJournal tests ────────────────────────────────────

    #[test]
    fn test_memory_journal_tier_history() {
        let journal = MemoryJournal::new();
        let t0 = Utc::now();
        journal
            .append(JournalRecord::TierTransition { from: None, to: NeedsTier::Physiological, at: t0 })
            .unwrap();
        let t1 = Utc::now();
        journal
            .append(JournalRecord::TierTransition {
                from: Some(NeedsTier::Physiological),
                to: NeedsTier::Growth,
                at: t1,
            })
            .unwrap();

        let history = journal.tier_history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].tier, NeedsTier::Physiological);
        assert_eq!(history[0].exited_at, Some(t1));
        assert_eq!(history[1].tier, NeedsTier::Growth);
        assert!(history[1].exited_at.is_none());
    }

    #[test]
    fn test_memory_journal_task_upsert() {
        let journal = MemoryJournal::new();
        let mut rec = TaskRecord {
            name: "economic_review".into(),
            interval_seconds: 3600,
            required_tier: NeedsTier::Physiological,
            last_run_at: None,
        };
        journal.append(JournalRecord::Task(rec.clone())).unwrap();
        rec.last_run_at = Some(Utc::now());
        journal.append(JournalRecord::Task(rec.clone())).unwrap();

        let tasks = journal.tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].last_run_at.is_some());
    }

    #[test]
    fn test_memory_journal_limits_keep_newest() {
        let journal = MemoryJournal::new();
        let mut balance = 0.0;
        for i in 0..5 {
            balance += i as f64;
            journal
                .append(JournalRecord::Transaction(Transaction {
                    id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    amount: i as f64,
                    balance_after: balance,
                    request_id: None,
                    memo: format!("credit {i}"),
                }))
                .unwrap();
        }
        let recent = journal.transactions(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].memo, "credit 4");
        assert_eq!(journal.last_balance().unwrap(), Some(10.0));
    }

    #[test]
    fn test_memory_journal_dialogue_filter() {
        let journal = MemoryJournal::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for (sid, text) in [(a, "one"), (b, "two"), (a, "three")] {
            journal
                .append(JournalRecord::Dialogue(DialogueTurnRecord {
                    session_id: sid,
                    stage: DialogueStage::Understanding,
                    turn_text: text.into(),
                    timestamp: Utc::now(),
                }))
                .unwrap();
        }
        assert_eq!(journal.dialogue(Some(a), 10).unwrap().len(), 2);
        assert_eq!(journal.dialogue(None, 10).unwrap().len(), 3);
    }

    #[test]
    fn test_journal_record_table_names() {
        let rec = JournalRecord::TierTransition { from: None, to: NeedsTier::Growth, at: Utc::now() };
        assert_eq!(rec.table(), "hierarchy_of_needs");
    }
}
