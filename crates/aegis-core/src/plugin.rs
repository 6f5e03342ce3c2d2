//! Guard plugin descriptors and the [`Guard`] trait.
//!
//! Guards are registered explicitly from configuration as
//! [`PluginDescriptor`] entries; there is no runtime discovery. A descriptor
//! is constructed at startup and immutable thereafter.

use crate::context::RequestContext;
use crate::error::GatewayResult;
use crate::verdict::GuardVerdict;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Capabilities a guard may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardCapability {
    /// Inspects the inbound prompt before dispatch.
    OnRequest,
    /// Inspects (and may rewrite) the backend's output.
    OnResponse,
}

/// Static description of a registered guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Guard name, unique within the registry.
    pub name: String,
    /// Execution priority; lower runs first.
    pub priority: i32,
    /// Which stages the guard participates in.
    pub capabilities: Vec<GuardCapability>,
    /// Disabled guards stay registered but are never invoked.
    pub enabled: bool,
}

impl PluginDescriptor {
    /// Create a descriptor with the given name and priority, enabled, with
    /// both capabilities.
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            priority,
            capabilities: vec![GuardCapability::OnRequest, GuardCapability::OnResponse],
            enabled: true,
        }
    }

    /// Restrict to the given capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<GuardCapability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether the guard participates in the given stage.
    #[must_use]
    pub fn has_capability(&self, capability: GuardCapability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// What a guard hands back to the chain executor.
#[derive(Debug, Clone)]
pub struct GuardOutput {
    /// The rendered verdict.
    pub verdict: GuardVerdict,
    /// Rewritten content, present only for masked outcomes. On the request
    /// stage this replaces the prompt; on the response stage it replaces the
    /// text handed to the next guard.
    pub rewrite: Option<String>,
}

impl GuardOutput {
    /// An allow output with no rewrite.
    pub fn allow(guard: impl Into<String>) -> Self {
        Self {
            verdict: GuardVerdict::allow(guard),
            rewrite: None,
        }
    }

    /// Wrap a verdict with no rewrite.
    #[must_use]
    pub fn from_verdict(verdict: GuardVerdict) -> Self {
        Self {
            verdict,
            rewrite: None,
        }
    }

    /// Wrap a masked verdict together with the rewritten content.
    #[must_use]
    pub fn masked(verdict: GuardVerdict, rewrite: String) -> Self {
        Self {
            verdict,
            rewrite: Some(rewrite),
        }
    }
}

/// A pluggable detector in the guard chain.
///
/// Guards must be pure functions of their inputs: identical context input
/// yields an identical verdict on repeated evaluation. An `Err` from either
/// hook is treated as a block by the chain executor (fail-closed).
#[async_trait]
pub trait Guard: Send + Sync {
    /// Guard name; must match the registered descriptor.
    fn name(&self) -> &str;

    /// Inspect the inbound prompt.
    async fn on_request(&self, ctx: &RequestContext) -> GatewayResult<GuardOutput> {
        let _ = ctx;
        Ok(GuardOutput::allow(self.name()))
    }

    /// Inspect the backend output. `text` reflects rewrites applied by
    /// earlier response-stage guards.
    async fn on_response(&self, ctx: &RequestContext, text: &str) -> GatewayResult<GuardOutput> {
        let _ = (ctx, text);
        Ok(GuardOutput::allow(self.name()))
    }
}
