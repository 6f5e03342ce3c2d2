//! Provider profiles and the backend abstraction.
//!
//! A [`ProviderProfile`] describes one configured backend: where it lives,
//! which credential to use, and how dispatch should behave (timeout, retry
//! budget, backoff). [`CompletionBackend`] is the normalized contract every
//! concrete integration satisfies, so the rest of the pipeline never
//! branches on backend identity.

use crate::error::GatewayResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff policy between dispatch attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Constant delay between attempts.
    Fixed {
        /// Delay applied after every failed attempt.
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },
    /// Exponentially growing delay, capped at `max`.
    Exponential {
        /// Delay after the first failed attempt.
        #[serde(with = "humantime_serde")]
        base: Duration,
        /// Upper bound on the delay.
        #[serde(with = "humantime_serde")]
        max: Duration,
        /// Growth factor per attempt.
        multiplier: f64,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying after the given failed attempt (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => *delay,
            Self::Exponential {
                base,
                max,
                multiplier,
            } => {
                let raw = base.as_millis() as f64 * multiplier.powi(attempt as i32);
                Duration::from_millis(raw.min(max.as_millis() as f64) as u64)
            }
        }
    }
}

/// One configured backend.
///
/// Selection is a pure function of (override headers, group config,
/// default); profiles themselves are immutable after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Profile name, referenced by overrides and group config.
    pub name: String,
    /// Backend endpoint URL.
    pub endpoint: String,
    /// Name of the environment variable holding the credential.
    /// Resolved at startup; never stored in the profile itself.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Default model for this profile.
    pub model: String,
    /// Per-attempt timeout. An attempt exceeding it is abandoned.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    /// Maximum number of attempts.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff between attempts.
    #[serde(default)]
    pub backoff: BackoffPolicy,
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

const fn default_max_retries() -> u32 {
    3
}

impl ProviderProfile {
    /// Create a profile with default timeout, retry, and backoff settings.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key_env: None,
            model: model.into(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            backoff: BackoffPolicy::default(),
        }
    }

    /// Set the credential environment variable.
    #[must_use]
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Normalized completion request handed to a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The prompt (post-guard, possibly masked).
    pub prompt: String,
    /// Model identifier to use.
    pub model: String,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Create a request with no sampling overrides.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Token usage reported by a backend, when available.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated.
    pub completion_tokens: u32,
    /// Total tokens.
    pub total_tokens: u32,
}

/// Normalized backend result. Every integration produces this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text.
    pub text: String,
    /// Provider profile that produced it.
    pub provider: String,
    /// Model that produced it.
    pub model: String,
    /// Token usage, when the backend reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Wall-clock latency of the successful attempt.
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
    /// Total attempts made, including the successful one. Filled by the
    /// dispatcher.
    pub attempts: u32,
}

/// Contract every concrete backend integration satisfies:
/// `complete(prompt, model, profile) → text | structured error`.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Profile name this backend serves.
    fn name(&self) -> &str;

    /// Execute one completion attempt. The dispatcher owns timeout and
    /// retry; implementations just make the call and normalize the result.
    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<Completion>;

    /// Whether the backend currently looks reachable.
    async fn is_reachable(&self) -> bool;
}
