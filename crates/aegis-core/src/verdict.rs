//! Guard verdicts.
//!
//! A verdict is the structured outcome a guard renders for one request or
//! response. It replaces the "return nothing to continue, return a dict to
//! block" convention with an explicit tagged type: there is no ambiguity
//! about what a missing return value means.

use serde::{Deserialize, Serialize};

/// The outcome a guard rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictOutcome {
    /// Content passed inspection unchanged.
    Allow,
    /// Content must not proceed. Terminal for request-stage guards.
    Block,
    /// Content was allowed after redaction.
    Masked,
}

/// Structured detail attached to a verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictDetail {
    /// Pattern category that matched (pattern guard).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Identifier of the specific rule that matched (pattern guard).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Qualifying entity types, deduplicated (PII guard).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_types: Vec<String>,
}

/// A single guard's verdict. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardVerdict {
    /// Name of the guard that produced this verdict.
    pub guard: String,
    /// The rendered outcome.
    pub outcome: VerdictOutcome,
    /// Human-readable reason.
    pub reason: String,
    /// Detection confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<VerdictDetail>,
}

impl GuardVerdict {
    /// Create an allow verdict with zero confidence and no detail.
    pub fn allow(guard: impl Into<String>) -> Self {
        Self {
            guard: guard.into(),
            outcome: VerdictOutcome::Allow,
            reason: String::new(),
            confidence: 0.0,
            detail: None,
        }
    }

    /// Create a block verdict.
    pub fn block(guard: impl Into<String>, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            guard: guard.into(),
            outcome: VerdictOutcome::Block,
            reason: reason.into(),
            confidence: confidence.clamp(0.0, 1.0),
            detail: None,
        }
    }

    /// Create a masked verdict.
    pub fn masked(guard: impl Into<String>, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            guard: guard.into(),
            outcome: VerdictOutcome::Masked,
            reason: reason.into(),
            confidence: confidence.clamp(0.0, 1.0),
            detail: None,
        }
    }

    /// Attach structured detail.
    #[must_use]
    pub fn with_detail(mut self, detail: VerdictDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Whether this verdict blocks the request.
    #[must_use]
    pub fn is_block(&self) -> bool {
        self.outcome == VerdictOutcome::Block
    }

    /// Whether this verdict redacted content.
    #[must_use]
    pub fn is_masked(&self) -> bool {
        self.outcome == VerdictOutcome::Masked
    }
}
