//! Per-request context and the request state machine.

use crate::error::{GatewayError, GatewayResult};
use crate::verdict::GuardVerdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Explicit provider/model override carried on the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOverride {
    /// Requested provider profile name.
    pub provider: String,
    /// Requested model identifier.
    pub model: String,
}

/// Lifecycle phase of a request.
///
/// `Blocked`, `Completed`, and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPhase {
    /// Request received, nothing has run yet.
    Received,
    /// Credential validation in progress.
    Authenticating,
    /// Request-stage guards are running.
    GuardEvaluation,
    /// A request-stage guard blocked the request. Terminal.
    Blocked,
    /// Guards allowed; handing off to the provider router.
    Forwarding,
    /// Backend call in flight.
    ProviderCall,
    /// Backend call failed; retry budget may remain.
    ProviderError,
    /// Response-stage guards are running.
    ResponseFiltering,
    /// Response delivered. Terminal.
    Completed,
    /// Provider retries exhausted. Terminal.
    Failed,
}

impl RequestPhase {
    /// Whether the phase is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Blocked | Self::Completed | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use RequestPhase::{
            Authenticating, Blocked, Completed, Failed, Forwarding, GuardEvaluation,
            ProviderCall, ProviderError, Received, ResponseFiltering,
        };
        matches!(
            (self, next),
            (Received, Authenticating)
                | (Authenticating, GuardEvaluation | Failed)
                | (GuardEvaluation, Blocked | Forwarding)
                | (Forwarding, ProviderCall | Blocked)
                | (ProviderCall, ProviderError | ResponseFiltering)
                | (ProviderError, ProviderCall | Failed)
                | (ResponseFiltering, Completed)
        )
    }
}

impl std::fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Authenticating => "authenticating",
            Self::GuardEvaluation => "guard_evaluation",
            Self::Blocked => "blocked",
            Self::Forwarding => "forwarding",
            Self::ProviderCall => "provider_call",
            Self::ProviderError => "provider_error",
            Self::ResponseFiltering => "response_filtering",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-request context.
///
/// Created once per request by the context builder and destroyed at the end
/// of the request. Mutable only by appending verdicts, advancing the phase,
/// and applying a masking rewrite to the prompt. Guards cannot delete or
/// reorder verdicts recorded by earlier guards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Correlation id shared with the audit trail and webhook envelope.
    correlation_id: Uuid,
    /// The prompt under inspection.
    prompt: String,
    /// SHA-256 hash of the caller's API key. Raw keys never enter the context.
    api_key_hash: String,
    /// Client address as reported by the transport.
    client_addr: String,
    /// When the request was received.
    timestamp: DateTime<Utc>,
    /// Optional group identifier for group-level routing.
    group_id: Option<String>,
    /// Optional explicit provider/model override.
    route_override: Option<RouteOverride>,
    /// Ordered verdict chain. Append-only.
    verdicts: Vec<GuardVerdict>,
    /// Current lifecycle phase.
    phase: RequestPhase,
}

impl RequestContext {
    /// Start building a context.
    #[must_use]
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Correlation id for this request.
    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// The prompt text.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Hashed API key.
    #[must_use]
    pub fn api_key_hash(&self) -> &str {
        &self.api_key_hash
    }

    /// Client address.
    #[must_use]
    pub fn client_addr(&self) -> &str {
        &self.client_addr
    }

    /// Receive timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Group identifier, if any.
    #[must_use]
    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    /// Explicit route override, if any.
    #[must_use]
    pub fn route_override(&self) -> Option<&RouteOverride> {
        self.route_override.as_ref()
    }

    /// The ordered verdict chain.
    #[must_use]
    pub fn verdicts(&self) -> &[GuardVerdict] {
        &self.verdicts
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// Append a verdict to the chain.
    pub fn push_verdict(&mut self, verdict: GuardVerdict) {
        self.verdicts.push(verdict);
    }

    /// Whether any recorded verdict is a block.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.verdicts.iter().any(GuardVerdict::is_block)
    }

    /// Replace the prompt with a masked rewrite.
    ///
    /// This is the only permitted prompt mutation; it exists for mask-mode
    /// guards that redact spans before dispatch.
    pub fn apply_mask(&mut self, masked: String) {
        self.prompt = masked;
    }

    /// Advance the state machine.
    ///
    /// # Errors
    /// Returns an internal error on an illegal transition; callers treat
    /// that as fail-closed.
    pub fn advance(&mut self, next: RequestPhase) -> GatewayResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(GatewayError::internal(format!(
                "illegal phase transition {} -> {next}",
                self.phase
            )));
        }
        self.phase = next;
        Ok(())
    }
}

/// Builder for [`RequestContext`].
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    prompt: String,
    api_key_hash: String,
    client_addr: String,
    group_id: Option<String>,
    route_override: Option<RouteOverride>,
}

impl RequestContextBuilder {
    /// Set the prompt text.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the hashed API key.
    #[must_use]
    pub fn api_key_hash(mut self, hash: impl Into<String>) -> Self {
        self.api_key_hash = hash.into();
        self
    }

    /// Set the client address.
    #[must_use]
    pub fn client_addr(mut self, addr: impl Into<String>) -> Self {
        self.client_addr = addr.into();
        self
    }

    /// Set the group identifier.
    #[must_use]
    pub fn group_id(mut self, group: Option<String>) -> Self {
        self.group_id = group;
        self
    }

    /// Set the explicit provider/model override.
    #[must_use]
    pub fn route_override(mut self, route_override: Option<RouteOverride>) -> Self {
        self.route_override = route_override;
        self
    }

    /// Build the context in the `Received` phase.
    #[must_use]
    pub fn build(self) -> RequestContext {
        RequestContext {
            correlation_id: Uuid::new_v4(),
            prompt: self.prompt,
            api_key_hash: self.api_key_hash,
            client_addr: self.client_addr,
            timestamp: Utc::now(),
            group_id: self.group_id,
            route_override: self.route_override,
            verdicts: Vec::new(),
            phase: RequestPhase::Received,
        }
    }
}
