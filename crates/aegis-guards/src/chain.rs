//! Sequential guard chain execution.
//!
//! Guards run strictly in priority order on the request path and short-
//! circuit on the first block. The response path never refuses output for
//! content reasons, but a guard failure there still degrades to a block:
//! an inspection layer that cannot inspect must not wave content through.

use aegis_core::{
    Guard, GuardCapability, GuardVerdict, PluginDescriptor, RequestContext, VerdictOutcome,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Outcome of running the request-stage chain.
#[derive(Debug, Clone)]
pub enum RequestChainResult {
    /// Every guard allowed (or masked); the request may proceed. The
    /// context's prompt reflects any masking rewrites.
    Allowed,
    /// A guard blocked, or a guard failed and the chain failed closed.
    Blocked(GuardVerdict),
}

impl RequestChainResult {
    /// Whether the chain blocked the request.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

/// Outcome of running the response-stage chain.
#[derive(Debug, Clone)]
pub enum ResponseChainResult {
    /// The (possibly rewritten) response text to return to the caller.
    Filtered {
        /// Final text after all rewrites.
        text: String,
        /// Whether any guard rewrote the text.
        modified: bool,
    },
    /// A response guard failed; the response is withheld.
    Blocked(GuardVerdict),
}

/// Runs registered guards in priority order.
///
/// Built once at startup from configuration; the guard set never changes at
/// runtime. Cloning shares the underlying guard instances.
#[derive(Clone)]
pub struct ChainExecutor {
    entries: Vec<(PluginDescriptor, Arc<dyn Guard>)>,
}

impl ChainExecutor {
    /// Build an executor. Entries are sorted by ascending priority; ties
    /// keep registration order. Disabled guards are retained for listing
    /// but skipped during execution.
    #[must_use]
    pub fn new(mut entries: Vec<(PluginDescriptor, Arc<dyn Guard>)>) -> Self {
        entries.sort_by_key(|(descriptor, _)| descriptor.priority);
        Self { entries }
    }

    /// Descriptors of all registered guards, in execution order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.entries.iter().map(|(d, _)| d.clone()).collect()
    }

    /// Number of enabled guards.
    #[must_use]
    pub fn enabled_count(&self) -> usize {
        self.entries.iter().filter(|(d, _)| d.enabled).count()
    }

    fn active(&self, stage: GuardCapability) -> impl Iterator<Item = &(PluginDescriptor, Arc<dyn Guard>)> {
        self.entries
            .iter()
            .filter(move |(d, _)| d.enabled && d.has_capability(stage))
    }

    /// Run the request-stage chain.
    ///
    /// Every verdict is appended to the context. The first block stops the
    /// chain; guards after it never run. A guard `Err` is converted into a
    /// block verdict attributed to that guard (fail-closed).
    pub async fn run_request(&self, ctx: &mut RequestContext) -> RequestChainResult {
        for (descriptor, guard) in self.active(GuardCapability::OnRequest) {
            let output = match guard.on_request(ctx).await {
                Ok(output) => output,
                Err(err) => {
                    error!(guard = %descriptor.name, error = %err, "request guard failed");
                    let verdict =
                        GuardVerdict::block(&descriptor.name, "guard failure", 1.0);
                    ctx.push_verdict(verdict.clone());
                    return RequestChainResult::Blocked(verdict);
                }
            };
            debug!(
                guard = %descriptor.name,
                outcome = ?output.verdict.outcome,
                "request guard evaluated"
            );
            let verdict = output.verdict.clone();
            ctx.push_verdict(output.verdict);
            match verdict.outcome {
                VerdictOutcome::Block => return RequestChainResult::Blocked(verdict),
                VerdictOutcome::Masked => {
                    if let Some(rewrite) = output.rewrite {
                        ctx.apply_mask(rewrite);
                    }
                }
                VerdictOutcome::Allow => {}
            }
        }
        RequestChainResult::Allowed
    }

    /// Run the response-stage chain over `text`.
    ///
    /// Rewrites thread through the chain: each guard sees the text as left
    /// by its predecessors. A `Block` outcome here violates the guard
    /// contract and is treated the same as a guard failure.
    pub async fn run_response(
        &self,
        ctx: &mut RequestContext,
        text: String,
    ) -> ResponseChainResult {
        let mut current = text;
        let mut modified = false;
        for (descriptor, guard) in self.active(GuardCapability::OnResponse) {
            let output = match guard.on_response(ctx, &current).await {
                Ok(output) => output,
                Err(err) => {
                    error!(guard = %descriptor.name, error = %err, "response guard failed");
                    let verdict =
                        GuardVerdict::block(&descriptor.name, "guard failure", 1.0);
                    ctx.push_verdict(verdict.clone());
                    return ResponseChainResult::Blocked(verdict);
                }
            };
            let verdict = output.verdict.clone();
            ctx.push_verdict(output.verdict);
            match verdict.outcome {
                VerdictOutcome::Block => {
                    warn!(
                        guard = %descriptor.name,
                        "response guard rendered a block; withholding response"
                    );
                    return ResponseChainResult::Blocked(verdict);
                }
                VerdictOutcome::Masked => {
                    if let Some(rewrite) = output.rewrite {
                        current = rewrite;
                        modified = true;
                    }
                }
                VerdictOutcome::Allow => {}
            }
        }
        ResponseChainResult::Filtered {
            text: current,
            modified,
        }
    }
}
