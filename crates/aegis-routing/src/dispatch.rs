//! Resilient dispatch against a selected backend.
//!
//! The dispatcher owns the per-attempt timeout, the retry budget, and the
//! backoff schedule; backends just make one call and normalize the result.
//! Only transient failures are retried. A backend rejection such as an
//! invalid credential comes back immediately with the attempt count it
//! actually consumed.

use aegis_core::{BackoffPolicy, Completion, CompletionBackend, CompletionRequest, GatewayError};
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

/// Terminal result of a dispatch, attempts included either way.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A completion was obtained. `attempts` inside is filled in.
    Success(Completion),
    /// All attempts failed or the error was not retryable.
    Failure {
        /// The last error observed.
        error: GatewayError,
        /// Attempts actually made.
        attempts: u32,
    },
}

impl DispatchOutcome {
    /// Attempts consumed by this dispatch.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success(completion) => completion.attempts,
            Self::Failure { attempts, .. } => *attempts,
        }
    }
}

/// Executes completion calls with timeout, retry, and jittered backoff.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    /// Jitter factor in `[0.0, 1.0]` applied around each backoff delay.
    jitter: f64,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self { jitter: 0.25 }
    }
}

impl Dispatcher {
    /// Dispatcher with an explicit jitter factor. Tests pass 0.0 to make
    /// delays deterministic.
    #[must_use]
    pub fn with_jitter(jitter: f64) -> Self {
        Self {
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= f64::EPSILON {
            return delay;
        }
        let base = delay.as_millis() as f64;
        let range = base * self.jitter;
        let offset = rand::thread_rng().gen_range(-range..=range);
        Duration::from_millis((base + offset).max(0.0) as u64)
    }

    /// Run the attempt loop.
    ///
    /// `max_attempts` and `timeout` come from the selected profile; an
    /// attempt that exceeds `timeout` is abandoned and counts as a timeout
    /// failure. The successful completion carries the total attempt count.
    pub async fn dispatch(
        &self,
        backend: &dyn CompletionBackend,
        request: &CompletionRequest,
        timeout: Duration,
        max_attempts: u32,
        backoff: &BackoffPolicy,
    ) -> DispatchOutcome {
        let max_attempts = max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let result = match tokio::time::timeout(timeout, backend.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::provider_timeout(backend.name(), timeout)),
            };

            match result {
                Ok(mut completion) => {
                    if attempts > 1 {
                        debug!(
                            provider = %backend.name(),
                            attempts,
                            "dispatch succeeded after retry"
                        );
                    }
                    completion.attempts = attempts;
                    return DispatchOutcome::Success(completion);
                }
                Err(error) => {
                    if !error.is_retryable() || attempts >= max_attempts {
                        return DispatchOutcome::Failure { error, attempts };
                    }
                    let delay = self.jittered(backoff.delay_for_attempt(attempts - 1));
                    warn!(
                        provider = %backend.name(),
                        attempt = attempts,
                        max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying after provider failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
