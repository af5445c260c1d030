#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;
    use warden_core::*;
    use warden_store::SqliteStore;

    fn action(desc: &str, outcome: Outcome) -> JournalRecord {
        JournalRecord::Action(ActionRecord {
            request_id: Uuid::new_v4(),
            description: desc.into(),
            urgent: false,
            outcome,
            rationale: "no mandate rule matched".into(),
            timestamp: Utc::now(),
        })
    }

    fn tx(amount: f64, balance_after: f64, request_id: Option<Uuid>) -> JournalRecord {
        JournalRecord::Transaction(Transaction {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            amount,
            balance_after,
            request_id,
            memo: String::new(),
        })
    }

    // ── Actions / audit chain ──────────────────────────────────

    mod actions {
        use super::*;

        #[test]
        fn test_actions_roundtrip_in_order() {
            let store = SqliteStore::open_in_memory().unwrap();
            store.append(action("first", Outcome::Allow)).unwrap();
            store.append(action("second", Outcome::Flag)).unwrap();
            store.append(action("third", Outcome::Block)).unwrap();

            let recent = store.actions(2).unwrap();
            assert_eq!(recent.len(), 2);
            assert_eq!(recent[0].description, "second");
            assert_eq!(recent[0].outcome, Outcome::Flag);
            assert_eq!(recent[1].description, "third");
            assert_eq!(recent[1].outcome, Outcome::Block);
        }

        #[test]
        fn test_chain_intact() {
            let store = SqliteStore::open_in_memory().unwrap();
            for i in 0..5 {
                store.append(action(&format!("action {i}"), Outcome::Allow)).unwrap();
            }
            let report = store.verify_chain().unwrap();
            assert_eq!(report.rows, 5);
            assert!(report.is_intact());
        }

        #[test]
        fn test_chain_detects_tampering() {
            let store = SqliteStore::open_in_memory().unwrap();
            for i in 0..4 {
                store.append(action(&format!("action {i}"), Outcome::Block)).unwrap();
            }
            store
                .db()
                .execute("UPDATE actions SET outcome = 'allow' WHERE seq = 2", [])
                .unwrap();
            let report = store.verify_chain().unwrap();
            assert_eq!(report.broken_at, Some(2));
        }

        #[test]
        fn test_chain_detects_deletion() {
            let store = SqliteStore::open_in_memory().unwrap();
            for i in 0..4 {
                store.append(action(&format!("action {i}"), Outcome::Allow)).unwrap();
            }
            store.db().execute("DELETE FROM actions WHERE seq = 2", []).unwrap();
            assert!(!store.verify_chain().unwrap().is_intact());
        }
    }

    // ── Transactions ───────────────────────────────────────────

    mod transactions {
        use super::*;

        #[test]
        fn test_last_balance() {
            let store = SqliteStore::open_in_memory().unwrap();
            assert_eq!(store.last_balance().unwrap(), None);
            store.append(tx(100.0, 100.0, None)).unwrap();
            store.append(tx(-2.5, 97.5, Some(Uuid::new_v4()))).unwrap();
            assert_eq!(store.last_balance().unwrap(), Some(97.5));
            let all = store.transactions(10).unwrap();
            assert_eq!(all.len(), 2);
            assert!(all[0].request_id.is_none());
            assert!(all[1].request_id.is_some());
        }

        #[test]
        fn test_one_transaction_per_request() {
            let store = SqliteStore::open_in_memory().unwrap();
            let rid = Uuid::new_v4();
            store.append(tx(-1.0, 99.0, Some(rid))).unwrap();
            let err = store.append(tx(-1.0, 98.0, Some(rid))).unwrap_err();
            assert!(matches!(err, WardenError::Store(_)));
            // credits without a request id are unconstrained
            store.append(tx(5.0, 104.0, None)).unwrap();
            store.append(tx(5.0, 109.0, None)).unwrap();
            assert_eq!(store.transactions(10).unwrap().len(), 3);
        }
    }

    // ── Dialogue / hierarchy / tasks ───────────────────────────

    mod other_tables {
        use super::*;

        #[test]
        fn test_dialogue_filter_by_session() {
            let store = SqliteStore::open_in_memory().unwrap();
            let a = Uuid::new_v4();
            let b = Uuid::new_v4();
            for (sid, stage) in [
                (a, DialogueStage::Understanding),
                (b, DialogueStage::Understanding),
                (a, DialogueStage::RiskIdentification),
            ] {
                store
                    .append(JournalRecord::Dialogue(DialogueTurnRecord {
                        session_id: sid,
                        stage,
                        turn_text: format!("agent: {stage}"),
                        timestamp: Utc::now(),
                    }))
                    .unwrap();
            }
            let turns = store.dialogue(Some(a), 10).unwrap();
            assert_eq!(turns.len(), 2);
            assert_eq!(turns[1].stage, DialogueStage::RiskIdentification);
            assert_eq!(store.dialogue(None, 10).unwrap().len(), 3);
        }

        #[test]
        fn test_tier_transitions_close_previous_row() {
            let store = SqliteStore::open_in_memory().unwrap();
            let t0 = Utc::now();
            let t1 = t0 + Duration::seconds(5);
            store
                .append(JournalRecord::TierTransition { from: None, to: NeedsTier::Physiological, at: t0 })
                .unwrap();
            store
                .append(JournalRecord::TierTransition {
                    from: Some(NeedsTier::Physiological),
                    to: NeedsTier::Growth,
                    at: t1,
                })
                .unwrap();
            let history = store.tier_history(10).unwrap();
            assert_eq!(history.len(), 2);
            assert_eq!(history[0].tier, NeedsTier::Physiological);
            assert_eq!(history[0].exited_at, Some(t1));
            assert_eq!(history[1].tier, NeedsTier::Growth);
            assert!(history[1].exited_at.is_none());
        }

        #[test]
        fn test_task_upsert_and_runs() {
            let store = SqliteStore::open_in_memory().unwrap();
            let mut task = TaskRecord {
                name: "economic_review".into(),
                interval_seconds: 3600,
                required_tier: NeedsTier::Physiological,
                last_run_at: None,
            };
            store.append(JournalRecord::Task(task.clone())).unwrap();
            let now = Utc::now();
            task.last_run_at = Some(now);
            store.append(JournalRecord::Task(task.clone())).unwrap();
            let tasks = store.tasks().unwrap();
            assert_eq!(tasks, vec![task]);

            for outcome in [
                TaskOutcome::Succeeded { summary: "balance healthy".into() },
                TaskOutcome::TimedOut,
            ] {
                store
                    .append(JournalRecord::TaskRun(TaskRunRecord {
                        task_name: "economic_review".into(),
                        started_at: now,
                        ended_at: now,
                        outcome,
                    }))
                    .unwrap();
            }
            let runs = store.task_runs(10).unwrap();
            assert_eq!(runs.len(), 2);
            assert!(runs[0].outcome.is_success());
            assert_eq!(runs[1].outcome, TaskOutcome::TimedOut);
        }
    }

    // ── On-disk persistence ────────────────────────────────────

    mod persistence {
        use super::*;

        #[test]
        fn test_reopen_keeps_rows_and_chain() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested").join("warden.db");
            {
                let store = SqliteStore::open(&path).unwrap();
                store.append(action("persisted", Outcome::Allow)).unwrap();
                store.append(tx(50.0, 150.0, None)).unwrap();
            }
            let store = SqliteStore::open(&path).unwrap();
            assert_eq!(store.actions(10).unwrap()[0].description, "persisted");
            assert_eq!(store.last_balance().unwrap(), Some(150.0));
            store.append(action("after reopen", Outcome::Flag)).unwrap();
            assert!(store.verify_chain().unwrap().is_intact());
        }
    }
}
