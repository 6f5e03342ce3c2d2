//! OpenAI-compatible chat completions backend.
//!
//! Speaks the `/chat/completions` wire format, which also covers the many
//! self-hosted servers that expose the same API. Authentication is a bearer
//! token resolved at startup; the raw key lives in a [`SecretString`] and is
//! never logged.

use aegis_core::{Completion, CompletionBackend, CompletionRequest, GatewayError, GatewayResult, Usage};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// OpenAI-compatible backend over one configured profile.
pub struct OpenAiBackend {
    name: String,
    endpoint: String,
    api_key: Option<SecretString>,
    client: Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl OpenAiBackend {
    /// Create a backend for the given profile name and endpoint.
    ///
    /// # Errors
    /// Returns an internal error if the HTTP client cannot be built.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(32)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key,
            client,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }

    fn map_error_status(&self, status: u16, message: String) -> GatewayError {
        match status {
            401 | 403 => GatewayError::provider_upstream(
                &self.name,
                format!("credential rejected: {message}"),
                Some(status),
                false,
            ),
            429 => GatewayError::provider_upstream(&self.name, message, Some(status), true),
            s if s >= 500 => {
                GatewayError::provider_upstream(&self.name, message, Some(status), true)
            }
            _ => GatewayError::provider_upstream(&self.name, message, Some(status), false),
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<Completion> {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut http = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key.expose_secret());
        }

        let started = Instant::now();
        let response = http.send().await.map_err(|e| {
            warn!(provider = %self.name, error = %e, "request failed to send");
            GatewayError::provider_upstream(&self.name, e.to_string(), None, true)
        })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .ok()
                .and_then(|b| b.error)
                .map_or(text, |d| d.message);
            return Err(self.map_error_status(status, message));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            GatewayError::provider_upstream(
                &self.name,
                format!("malformed response body: {e}"),
                Some(status),
                false,
            )
        })?;
        let latency = started.elapsed();

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                GatewayError::provider_upstream(
                    &self.name,
                    "response contained no choices",
                    Some(status),
                    false,
                )
            })?;

        debug!(provider = %self.name, latency_ms = latency.as_millis(), "completion received");

        Ok(Completion {
            text,
            provider: self.name.clone(),
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            usage: parsed.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            latency,
            attempts: 0,
        })
    }

    async fn is_reachable(&self) -> bool {
        let url = format!("{}/models", self.endpoint.trim_end_matches('/'));
        let mut http = self.client.get(url);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key.expose_secret());
        }
        match http.send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
