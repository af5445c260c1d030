use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;
use warden_config::BackendConfig;
use warden_core::{BackendId, WardenError};

/// One execution backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendProfile {
    pub id: BackendId,
    /// Capability tier; higher is more capable.
    pub tier: u8,
    pub cost_per_unit: f64,
    pub available: bool,
    /// Local / no-marginal-cost; the only kind eligible below the budget floor.
    pub local: bool,
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

impl BackendProfile {
    pub fn new(id: impl Into<String>, tier: u8, cost_per_unit: f64) -> Self {
        Self {
            id: id.into(),
            tier,
            cost_per_unit,
            available: true,
            local: false,
            endpoint: None,
            model: None,
        }
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Model name to request: explicit, else the part of the id after ':'.
    pub fn model_name(&self) -> &str {
        match &self.model {
            Some(m) => m,
            None => self.id.split_once(':').map(|(_, m)| m).unwrap_or(&self.id),
        }
    }
}

impl From<&BackendConfig> for BackendProfile {
    fn from(cfg: &BackendConfig) -> Self {
        Self {
            id: cfg.id.clone(),
            tier: cfg.tier,
            cost_per_unit: cfg.cost_per_unit,
            available: cfg.available,
            local: cfg.local,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
        }
    }
}

/// The backend registry. Static configuration; only admin updates change it.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    profiles: RwLock<Vec<BackendProfile>>,
}

impl BackendRegistry {
    pub fn new(profiles: Vec<BackendProfile>) -> warden_core::Result<Self> {
        let mut seen = HashSet::new();
        for p in &profiles {
            if !seen.insert(p.id.as_str()) {
                return Err(WardenError::ConfigValidation {
                    field: format!("router.backends.{}", p.id),
                    reason: "duplicate backend id".into(),
                });
            }
        }
        Ok(Self {
            profiles: RwLock::new(profiles),
        })
    }

    pub fn from_config(backends: &[BackendConfig]) -> warden_core::Result<Self> {
        Self::new(backends.iter().map(BackendProfile::from).collect())
    }

    /// Snapshot of all profiles in declaration order.
    pub fn profiles(&self) -> Vec<BackendProfile> {
        self.profiles.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<BackendProfile> {
        self.profiles.read().iter().find(|p| p.id == id).cloned()
    }

    /// Admin update: mark a backend available or unavailable.
    pub fn set_availability(&self, id: &str, available: bool) -> warden_core::Result<()> {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| WardenError::UnknownBackend(id.to_string()))?;
        profile.available = available;
        info!(backend = %id, available, "backend availability updated");
        Ok(())
    }

    /// Admin update: insert a profile or replace the one with the same id.
    pub fn upsert(&self, profile: BackendProfile) {
        let mut profiles = self.profiles.write();
        info!(backend = %profile.id, tier = profile.tier, cost = profile.cost_per_unit, "backend profile updated");
        match profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile,
            None => profiles.push(profile),
        }
    }

    /// Admin update: remove a profile.
    pub fn remove(&self, id: &str) -> warden_core::Result<BackendProfile> {
        let mut profiles = self.profiles.write();
        let pos = profiles
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| WardenError::UnknownBackend(id.to_string()))?;
        info!(backend = %id, "backend removed");
        Ok(profiles.remove(pos))
    }
}
