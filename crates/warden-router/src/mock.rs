//! Mock backend client for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use warden_core::{BackendClient, Invocation, WardenError};

/// A mock backend client.
///
/// # Example
/// ```
/// use warden_router::mock::MockBackend;
/// let backend = MockBackend::new()
///     .with_response("local:llama2", "hello", 42);
/// ```
#[derive(Clone, Default)]
pub struct MockBackend {
    queued: Arc<Mutex<HashMap<String, VecDeque<Result<Invocation, String>>>>>,
    down: Arc<Mutex<HashSet<String>>>,
    /// Track all calls received as `(backend_id, payload)`.
    pub calls: Arc<Mutex<Vec<(String, String)>>>,
    default_units: u64,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            default_units: 100,
            ..Default::default()
        }
    }

    /// Units reported when nothing is queued for a backend.
    pub fn with_default_units(mut self, units: u64) -> Self {
        self.default_units = units;
        self
    }

    pub fn with_response(self, backend: &str, output: &str, units: u64) -> Self {
        self.queue_response(backend, output, units);
        self
    }

    pub fn queue_response(&self, backend: &str, output: &str, units: u64) {
        self.queued
            .lock()
            .entry(backend.to_string())
            .or_default()
            .push_back(Ok(Invocation {
                output: output.to_string(),
                units,
            }));
    }

    /// The next call to `backend` faults with `reason`.
    pub fn queue_fault(&self, backend: &str, reason: &str) {
        self.queued
            .lock()
            .entry(backend.to_string())
            .or_default()
            .push_back(Err(reason.to_string()));
    }

    /// Every call to `backend` faults until [`MockBackend::restore`].
    pub fn take_down(&self, backend: &str) {
        self.down.lock().insert(backend.to_string());
    }

    pub fn restore(&self, backend: &str) {
        self.down.lock().remove(backend);
    }

    pub fn recorded_calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn invoke(&self, backend_id: &str, payload: &str) -> warden_core::Result<Invocation> {
        self.calls.lock().push((backend_id.to_string(), payload.to_string()));

        if self.down.lock().contains(backend_id) {
            return Err(WardenError::BackendFault {
                backend: backend_id.to_string(),
                reason: "backend is down".into(),
            });
        }

        let next = self
            .queued
            .lock()
            .get_mut(backend_id)
            .and_then(|q| q.pop_front());
        match next {
            Some(Ok(invocation)) => Ok(invocation),
            Some(Err(reason)) => Err(WardenError::BackendFault {
                backend: backend_id.to_string(),
                reason,
            }),
            None => Ok(Invocation {
                output: format!("[{}] {}", backend_id, payload),
                units: self.default_units,
            }),
        }
    }
}
