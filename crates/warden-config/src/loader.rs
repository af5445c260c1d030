use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::WardenConfig;

/// Loads the Warden configuration.
///
/// The backend registry is static configuration, so there is no hot-reload:
/// runtime changes go through explicit admin commands instead.
pub struct ConfigLoader {
    config: WardenConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > WARDEN_CONFIG env > ~/.warden/warden.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("WARDEN_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
            .join("warden.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> warden_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            WardenConfig::default()
        };

        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Build a loader around an in-memory config (tests, `--ephemeral`).
    pub fn from_config(config: WardenConfig) -> warden_core::Result<Self> {
        Self::check(&config)?;
        Ok(Self {
            config,
            config_path: PathBuf::from("<memory>"),
        })
    }

    /// Get a snapshot of the config.
    pub fn get(&self) -> WardenConfig {
        self.config.clone()
    }

    /// Path the config was (or would have been) read from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn parse(raw: &str, path: &Path) -> warden_core::Result<WardenConfig> {
        toml::from_str::<WardenConfig>(raw).map_err(|e| {
            warden_core::WardenError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Validate config: log warnings, fail on errors.
    fn check(config: &WardenConfig) -> warden_core::Result<()> {
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
                Ok(())
            }
            Err(e) => Err(warden_core::WardenError::Config(e)),
        }
    }

    /// Apply env var overrides (WARDEN_LOG_LEVEL, WARDEN_BUDGET_FLOOR, WARDEN_DB_PATH).
    fn apply_env_overrides(mut config: WardenConfig) -> WardenConfig {
        if let Ok(v) = std::env::var("WARDEN_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("WARDEN_BUDGET_FLOOR") {
            match v.parse::<f64>() {
                Ok(floor) => config.ledger.budget_floor = floor,
                Err(_) => warn!(value = %v, "ignoring unparsable WARDEN_BUDGET_FLOOR"),
            }
        }
        if let Ok(v) = std::env::var("WARDEN_DB_PATH") {
            config.store.db_path = PathBuf::from(v);
        }
        config
    }
}
