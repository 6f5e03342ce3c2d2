//! External validator notifier.
//!
//! Sends sealed envelopes to a configured responder and interprets its
//! decision. The notifier reports what happened; whether an unreachable
//! responder blocks the request is the caller's policy, driven by
//! [`NotifierMode`].

use crate::envelope::{EnvelopeSigner, WebhookPayload, SIGNATURE_HEADER};
use aegis_core::{GatewayError, GatewayResult};
use reqwest::Client;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Failure policy for the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierMode {
    /// Responder failures are logged and the pipeline proceeds.
    #[default]
    BestEffort,
    /// Responder denial or unreachability blocks the request.
    FailClosed,
}

/// Decision body returned by the responder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDecision {
    /// Whether the responder allows the request.
    pub allowed: bool,
    /// Optional human-readable reason.
    #[serde(default)]
    pub reason: Option<String>,
    /// Optional responder confidence.
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// What the consultation produced.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// Responder explicitly allowed.
    Allowed,
    /// Responder explicitly denied.
    Denied {
        /// Responder-supplied reason, if any.
        reason: Option<String>,
        /// Responder-supplied confidence, if any.
        confidence: Option<f64>,
    },
    /// Responder unreachable or returned garbage after all attempts.
    Unavailable {
        /// Last error observed.
        error: String,
    },
}

/// Signed-webhook client with a bounded retry budget.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    signer: EnvelopeSigner,
    client: Client,
    mode: NotifierMode,
    max_attempts: u32,
}

impl WebhookNotifier {
    /// Default per-call timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default attempt budget.
    pub const DEFAULT_ATTEMPTS: u32 = 2;

    /// Create a notifier.
    ///
    /// # Errors
    /// Returns an internal error if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        secret: SecretString,
        mode: NotifierMode,
        timeout: Duration,
        max_attempts: u32,
    ) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            signer: EnvelopeSigner::new(secret),
            client,
            mode,
            max_attempts: max_attempts.max(1),
        })
    }

    /// Configured failure policy.
    #[must_use]
    pub fn mode(&self) -> NotifierMode {
        self.mode
    }

    async fn post_once(&self, body: Vec<u8>, signature: &str) -> GatewayResult<WebhookDecision> {
        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::webhook(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::webhook(format!(
                "responder returned status {status}"
            )));
        }
        response
            .json::<WebhookDecision>()
            .await
            .map_err(|e| GatewayError::webhook(format!("malformed decision body: {e}")))
    }

    /// Seal the payload and consult the responder.
    ///
    /// Any transport or decode failure is retried up to the attempt budget;
    /// after that the outcome is `Unavailable` and the caller applies its
    /// mode policy. A well-formed denial is never retried.
    pub async fn consult(&self, payload: &WebhookPayload) -> WebhookOutcome {
        let envelope = match self.signer.seal(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                return WebhookOutcome::Unavailable {
                    error: err.to_string(),
                }
            }
        };

        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            match self
                .post_once(envelope.body.clone(), &envelope.signature)
                .await
            {
                Ok(decision) => {
                    debug!(
                        correlation_id = %envelope.correlation_id,
                        allowed = decision.allowed,
                        attempt,
                        "webhook responder decided"
                    );
                    return if decision.allowed {
                        WebhookOutcome::Allowed
                    } else {
                        WebhookOutcome::Denied {
                            reason: decision.reason,
                            confidence: decision.confidence,
                        }
                    };
                }
                Err(err) => {
                    warn!(
                        correlation_id = %envelope.correlation_id,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "webhook consult attempt failed"
                    );
                    last_error = err.to_string();
                }
            }
        }
        WebhookOutcome::Unavailable { error: last_error }
    }

    /// Fire-and-forget incident notification. Used after a block, when the
    /// pipeline outcome no longer depends on the responder; the task is
    /// spawned and never awaited.
    pub fn notify_incident(self: &Arc<Self>, payload: WebhookPayload) {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            if let WebhookOutcome::Unavailable { error } = notifier.consult(&payload).await {
                warn!(
                    correlation_id = %payload.correlation_id,
                    error = %error,
                    "incident notification failed"
                );
            }
        });
    }
}
