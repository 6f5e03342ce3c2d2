//! Error types for the gateway.
//!
//! Guard blocks are deliberately *not* part of this taxonomy: a block is a
//! first-class pipeline outcome carried in a [`crate::GuardVerdict`], never an
//! error. Everything here is either fatal for the request (authentication,
//! validation), a provider failure that may be retried, or a startup problem.

use std::time::Duration;

/// Result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Invalid or missing credential. Short-circuits before any guard runs.
    #[error("Authentication failed: {message}")]
    Auth {
        /// Human-readable reason, safe to surface to the caller.
        message: String,
    },

    /// Malformed or out-of-bounds request input.
    #[error("Validation failed: {message}")]
    Validation {
        /// Human-readable reason, safe to surface to the caller.
        message: String,
    },

    /// A backend attempt exceeded its per-attempt timeout.
    #[error("Provider '{provider}' timed out after {timeout:?}")]
    ProviderTimeout {
        /// Profile name of the backend that timed out.
        provider: String,
        /// The per-attempt timeout that was exceeded.
        timeout: Duration,
    },

    /// The backend returned an error response or was unreachable.
    #[error("Provider '{provider}' error: {message}")]
    ProviderUpstream {
        /// Profile name of the failing backend.
        provider: String,
        /// Diagnostic detail. Goes to the audit trail, never to the caller.
        message: String,
        /// HTTP-equivalent status from the backend, when known.
        status: Option<u16>,
        /// Whether another attempt is worthwhile.
        retryable: bool,
    },

    /// The external webhook validator failed or could not be reached.
    /// Non-fatal unless fail-closed mode is configured.
    #[error("Webhook error: {message}")]
    Webhook {
        /// Diagnostic detail.
        message: String,
    },

    /// Invalid configuration. Fatal at startup only, never at request time.
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the configuration.
        message: String,
    },

    /// Unexpected internal failure. Degrades to fail-closed in the chain.
    #[error("Internal error: {message}")]
    Internal {
        /// Diagnostic detail.
        message: String,
    },
}

impl GatewayError {
    /// Create an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a provider timeout error.
    pub fn provider_timeout(provider: impl Into<String>, timeout: Duration) -> Self {
        Self::ProviderTimeout {
            provider: provider.into(),
            timeout,
        }
    }

    /// Create an upstream provider error.
    pub fn provider_upstream(
        provider: impl Into<String>,
        message: impl Into<String>,
        status: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::ProviderUpstream {
            provider: provider.into(),
            message: message.into(),
            status,
            retryable,
        }
    }

    /// Create a webhook error.
    pub fn webhook(message: impl Into<String>) -> Self {
        Self::Webhook {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the dispatcher may retry after this error.
    ///
    /// Only transient provider failures qualify. Authentication and
    /// validation errors from a backend must never be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderTimeout { .. } => true,
            Self::ProviderUpstream {
                retryable, status, ..
            } => *retryable || matches!(status, Some(s) if *s >= 500 || *s == 429),
            _ => false,
        }
    }

    /// Whether this is a provider-side failure (timeout or upstream).
    #[must_use]
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            Self::ProviderTimeout { .. } | Self::ProviderUpstream { .. }
        )
    }
}
