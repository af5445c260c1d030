use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use warden_core::{BackendClient, Invocation, WardenError};

use crate::registry::BackendRegistry;

/// Backend client for Ollama-compatible `/api/generate` endpoints.
///
/// The endpoint and model are looked up in the registry on every call, so
/// admin updates take effect immediately.
pub struct HttpBackendClient {
    client: reqwest::Client,
    registry: Arc<BackendRegistry>,
}

impl HttpBackendClient {
    pub fn new(registry: Arc<BackendRegistry>, timeout: Duration) -> warden_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WardenError::Config(format!("http client: {e}")))?;
        Ok(Self { client, registry })
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn invoke(&self, backend_id: &str, payload: &str) -> warden_core::Result<Invocation> {
        let fault = |reason: String| WardenError::BackendFault {
            backend: backend_id.to_string(),
            reason,
        };

        let profile = self
            .registry
            .get(backend_id)
            .ok_or_else(|| WardenError::UnknownBackend(backend_id.to_string()))?;
        let endpoint = profile
            .endpoint
            .as_deref()
            .ok_or_else(|| fault("no endpoint configured".into()))?;

        let body = serde_json::json!({
            "model": profile.model_name(),
            "prompt": payload,
            "stream": false,
        });
        debug!(backend = %backend_id, endpoint, "invoking backend");

        let resp = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| fault(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(fault(format!("HTTP {}: {}", status.as_u16(), text)));
        }

        let data: serde_json::Value = resp.json().await.map_err(|e| fault(e.to_string()))?;
        let output = data["response"].as_str().unwrap_or("").to_string();
        let units = data["prompt_eval_count"].as_u64().unwrap_or(0) + data["eval_count"].as_u64().unwrap_or(0);

        Ok(Invocation { output, units })
    }
}
