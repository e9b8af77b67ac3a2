//! Model backend seam and the two production implementations.
//!
//! The primary remote backend rides on rig-core (Anthropic transport); the
//! secondary is a local Ollama-style HTTP server spoken to directly with
//! reqwest. Both honor a per-call timeout so the gateway's worst case stays
//! bounded at the sum of two timeouts.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::GatewayError;

/// One upstream model service.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Backend name for logging and breaker identification.
    fn name(&self) -> &str;

    /// Single bounded completion call. No internal retries — resilience
    /// lives in the gateway's fallback chain, not here.
    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Duration,
    ) -> Result<String, GatewayError>;
}

// ── Primary: remote model via rig-core ──────────────────────────────

/// Remote backend over rig-core's Anthropic client.
pub struct RigBackend {
    client: rig::client::Client<rig::providers::anthropic::client::AnthropicExt>,
    model: String,
}

impl RigBackend {
    pub fn new(api_key: &SecretString, model: &str) -> Result<Self, GatewayError> {
        use rig::providers::anthropic;

        let client: rig::client::Client<anthropic::client::AnthropicExt> =
            anthropic::Client::new(api_key.expose_secret()).map_err(|e| {
                GatewayError::BackendFailed {
                    backend: "primary".into(),
                    reason: format!("failed to create client: {e}"),
                }
            })?;

        tracing::info!(model = %model, "primary model backend ready");
        Ok(Self {
            client,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ModelBackend for RigBackend {
    fn name(&self) -> &str {
        "primary"
    }

    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Duration,
    ) -> Result<String, GatewayError> {
        use rig::client::CompletionClient;
        use rig::completion::Prompt;

        let agent = self
            .client
            .agent(&self.model)
            .preamble(system_prompt)
            .build();

        let call = async { agent.prompt(user_prompt.to_string()).await };
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(GatewayError::BackendFailed {
                backend: self.name().into(),
                reason: e.to_string(),
            }),
            Err(_) => Err(GatewayError::Timeout {
                backend: self.name().into(),
                timeout,
            }),
        }
    }
}

// ── Secondary: local model over HTTP ────────────────────────────────

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

/// Local Ollama-style backend.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    fn name(&self) -> &str {
        "secondary"
    }

    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Duration,
    ) -> Result<String, GatewayError> {
        let body = serde_json::json!({
            "model": self.model,
            "system": system_prompt,
            "prompt": user_prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout {
                        backend: self.name().into(),
                        timeout,
                    }
                } else {
                    GatewayError::BackendFailed {
                        backend: self.name().into(),
                        reason: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::BackendFailed {
                backend: self.name().into(),
                reason: format!("status {}", response.status()),
            });
        }

        let parsed: OllamaResponse =
            response
                .json()
                .await
                .map_err(|e| GatewayError::InvalidResponse {
                    backend: self.name().into(),
                    reason: e.to_string(),
                })?;

        if parsed.response.is_empty() {
            return Err(GatewayError::InvalidResponse {
                backend: self.name().into(),
                reason: "empty response body".into(),
            });
        }
        Ok(parsed.response)
    }
}
