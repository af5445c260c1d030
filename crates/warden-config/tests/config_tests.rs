#[cfg(test)]
mod tests {
    // ── Schema defaults ────────────────────────────────────────

    mod schema {
        use warden_config::*;
        use warden_core::{NeedsTier, Severity};

        #[test]
        fn test_default_config_is_valid() {
            let config = WardenConfig::default();
            let warnings = config.validate().expect("default config must validate");
            assert!(warnings.iter().all(|w| w.severity != WarningSeverity::Error));
        }

        #[test]
        fn test_default_values() {
            let config = WardenConfig::default();
            assert_eq!(config.ledger.starting_balance, 100.0);
            assert_eq!(config.ledger.budget_floor, 10.0);
            assert_eq!(config.hierarchy.min_balance, 50.0);
            assert!(config.gate.builtin_rules);
            assert!(!config.router.gate_on_marginal_value);
            assert_eq!(config.logging.level, "info");
        }

        #[test]
        fn test_default_tasks_cover_every_builtin() {
            let config = WardenConfig::default();
            let names: Vec<&str> = config.scheduler.tasks.iter().map(|t| t.name.as_str()).collect();
            for builtin in BUILTIN_TASKS {
                assert!(names.contains(builtin), "missing {builtin}");
            }
            let health = &config.scheduler.tasks[0];
            assert_eq!(health.name, "system_health_check");
            assert_eq!(health.interval_secs, 1800);
            assert_eq!(health.required_tier, NeedsTier::Physiological);
        }

        #[test]
        fn test_default_backends_include_local() {
            let config = WardenConfig::default();
            assert!(config.router.backends.iter().any(|b| b.local && b.available));
        }

        #[test]
        fn test_parse_minimal_toml() {
            let raw = r#"
                [ledger]
                starting_balance = 250.0
            "#;
            let config: WardenConfig = toml::from_str(raw).unwrap();
            assert_eq!(config.ledger.starting_balance, 250.0);
            // untouched sections keep defaults
            assert_eq!(config.ledger.budget_floor, 10.0);
            assert_eq!(config.scheduler.tick_secs, 10);
        }

        #[test]
        fn test_parse_rules_and_backends() {
            let raw = r#"
                [gate]
                builtin_rules = false

                [[gate.rules]]
                name = "no_prod_writes"
                severity = "critical"
                keywords = ["production"]
                unless = ["dry run"]
                alternative = "Run against staging first"

                [[router.backends]]
                id = "local:tiny"
                tier = 1
                cost_per_unit = 0.0
                local = true

                [[scheduler.tasks]]
                name = "economic_review"
                interval_secs = 60
                required_tier = "Physiological"
            "#;
            let config: WardenConfig = toml::from_str(raw).unwrap();
            assert_eq!(config.gate.rules.len(), 1);
            assert_eq!(config.gate.rules[0].severity, Severity::Critical);
            assert_eq!(config.gate.rules[0].unless, vec!["dry run".to_string()]);
            assert_eq!(config.router.backends.len(), 1);
            assert!(config.router.backends[0].available);
            assert_eq!(config.scheduler.tasks.len(), 1);
            assert!(config.scheduler.tasks[0].enabled);
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_json_roundtrip() {
            let config = WardenConfig::default();
            let json = serde_json::to_string(&config).unwrap();
            let back: WardenConfig = serde_json::from_str(&json).unwrap();
            assert_eq!(back.router.backends.len(), config.router.backends.len());
            assert_eq!(back.scheduler.tasks.len(), config.scheduler.tasks.len());
        }
    }

    // ── Validation ─────────────────────────────────────────────

    mod validation {
        use warden_config::*;

        #[test]
        fn test_duplicate_backend_id_is_error() {
            let mut config = WardenConfig::default();
            let dup = config.router.backends[0].clone();
            config.router.backends.push(dup);
            let err = config.validate().unwrap_err();
            assert!(err.contains("duplicate backend id"));
        }

        #[test]
        fn test_negative_cost_is_error() {
            let mut config = WardenConfig::default();
            config.router.backends[0].cost_per_unit = -1.0;
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_unknown_task_is_error() {
            let mut config = WardenConfig::default();
            config.scheduler.tasks.push(TaskConfig {
                name: "mine_crypto".into(),
                interval_secs: 60,
                required_tier: warden_core::NeedsTier::Growth,
                enabled: true,
            });
            let err = config.validate().unwrap_err();
            assert!(err.contains("mine_crypto"));
        }

        #[test]
        fn test_zero_tick_is_error() {
            let mut config = WardenConfig::default();
            config.scheduler.tick_secs = 0;
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_floor_above_balance_is_warning() {
            let mut config = WardenConfig::default();
            config.ledger.budget_floor = 500.0;
            let warnings = config.validate().unwrap();
            assert!(
                warnings
                    .iter()
                    .any(|w| w.field == "ledger.budget_floor" && w.severity == WarningSeverity::Warning)
            );
        }

        #[test]
        fn test_no_rules_is_warning() {
            let mut config = WardenConfig::default();
            config.gate.builtin_rules = false;
            let warnings = config.validate().unwrap();
            assert!(warnings.iter().any(|w| w.field == "gate"));
        }

        #[test]
        fn test_warning_messages_read_plainly() {
            let mut config = WardenConfig::default();
            config.ledger.budget_floor = 500.0;
            config.gate.builtin_rules = false;
            config.router.backends.retain(|b| !b.local);
            let warnings = config.validate().unwrap();
            assert!(warnings.len() >= 3);
            assert!(warnings.iter().any(|w| w.message.contains("so nothing can route")));
            assert!(warnings.iter().all(|w| !w.to_string().contains('\u{2014}')));
        }

        #[test]
        fn test_error_rate_out_of_range() {
            let mut config = WardenConfig::default();
            config.hierarchy.max_error_rate = 1.5;
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_warning_display_has_hint() {
            let w = ConfigWarning {
                field: "logging.format".into(),
                message: "unknown log format 'xml'".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Valid values: pretty, json, compact".into()),
            };
            let s = w.to_string();
            assert!(s.contains("logging.format"));
            assert!(s.contains("Valid values"));
        }
    }

    // ── Loader ─────────────────────────────────────────────────

    mod loader {
        use std::io::Write;
        use warden_config::*;

        #[test]
        fn test_load_missing_file_uses_defaults() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nope.toml");
            let loader = ConfigLoader::load(Some(&path)).unwrap();
            assert_eq!(loader.get().ledger.starting_balance, 100.0);
            assert_eq!(loader.path(), path.as_path());
        }

        #[test]
        fn test_load_from_file() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(
                file,
                r#"
                [hierarchy]
                min_balance = 75.0
                promotion_window_secs = 5
                "#
            )
            .unwrap();
            let loader = ConfigLoader::load(Some(file.path())).unwrap();
            let config = loader.get();
            assert_eq!(config.hierarchy.min_balance, 75.0);
            assert_eq!(config.hierarchy.promotion_window_secs, 5);
        }

        #[test]
        fn test_load_invalid_toml_fails() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "[ledger\nstarting_balance = ").unwrap();
            let err = ConfigLoader::load(Some(file.path())).err().unwrap();
            assert!(err.to_string().contains("failed to parse"));
        }

        #[test]
        fn test_load_rejects_invalid_values() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(
                file,
                r#"
                [scheduler]
                task_timeout_secs = 0
                "#
            )
            .unwrap();
            assert!(ConfigLoader::load(Some(file.path())).is_err());
        }

        #[test]
        fn test_from_config_validates() {
            let mut config = WardenConfig::default();
            config.scheduler.tick_secs = 0;
            assert!(ConfigLoader::from_config(config).is_err());
            assert!(ConfigLoader::from_config(WardenConfig::default()).is_ok());
        }

        #[test]
        fn test_resolve_path_prefers_explicit() {
            let explicit = std::path::Path::new("/tmp/explicit.toml");
            assert_eq!(ConfigLoader::resolve_path(Some(explicit)), explicit.to_path_buf());
        }
    }
}
