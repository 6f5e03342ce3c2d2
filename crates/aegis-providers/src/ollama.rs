//! Ollama backend.
//!
//! Talks to a local Ollama daemon via `/api/generate` in non-streaming
//! mode. Ollama needs no credential; reachability is probed against
//! `/api/tags`.

use aegis_core::{Completion, CompletionBackend, CompletionRequest, GatewayError, GatewayResult, Usage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Backend over a single Ollama daemon.
pub struct OllamaBackend {
    name: String,
    endpoint: String,
    client: Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    model: Option<String>,
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaBackend {
    /// Create a backend for the given profile name and daemon endpoint.
    ///
    /// # Errors
    /// Returns an internal error if the HTTP client cannot be built.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client,
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<Completion> {
        let options = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            })
        } else {
            None
        };
        let body = GenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            options,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(provider = %self.name, error = %e, "request failed to send");
                GatewayError::provider_upstream(&self.name, e.to_string(), None, true)
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            // Unknown model names come back as 404 and retrying cannot help.
            let retryable = status >= 500;
            return Err(GatewayError::provider_upstream(
                &self.name,
                text,
                Some(status),
                retryable,
            ));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            GatewayError::provider_upstream(
                &self.name,
                format!("malformed response body: {e}"),
                Some(status),
                false,
            )
        })?;
        let latency = started.elapsed();

        debug!(provider = %self.name, latency_ms = latency.as_millis(), "completion received");

        let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
            (None, None) => None,
            (prompt, completion) => {
                let prompt_tokens = prompt.unwrap_or(0);
                let completion_tokens = completion.unwrap_or(0);
                Some(Usage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens + completion_tokens,
                })
            }
        };

        Ok(Completion {
            text: parsed.response,
            provider: self.name.clone(),
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            usage,
            latency,
            attempts: 0,
        })
    }

    async fn is_reachable(&self) -> bool {
        match self.client.get(self.url("/api/tags")).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
