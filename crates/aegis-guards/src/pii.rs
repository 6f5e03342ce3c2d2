//! Personal-data detection and redaction.
//!
//! Entity recognition is a capability seam: the guard talks to an
//! [`EntityRecognizer`] trait so the detection engine can be swapped without
//! touching guard logic. The shipped [`RegexEntityRecognizer`] covers the
//! common structured entity types with fixed per-type confidences.

use aegis_core::{
    GatewayResult, Guard, GuardOutput, GuardVerdict, RequestContext, VerdictDetail,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Guard name used in verdicts and the plugin registry.
pub const GUARD_NAME: &str = "pii_guard";

/// A detected entity span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityFinding {
    /// Entity type label, e.g. `EMAIL_ADDRESS`.
    pub entity_type: String,
    /// Byte offset of the span start.
    pub start: usize,
    /// Byte offset one past the span end.
    pub end: usize,
    /// Recognizer confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

/// Pluggable entity recognition engine.
#[async_trait]
pub trait EntityRecognizer: Send + Sync {
    /// Detect entity spans in the text. Findings may overlap; the guard
    /// resolves overlaps when masking.
    async fn analyze(&self, text: &str) -> GatewayResult<Vec<EntityFinding>>;
}

/// What the guard does when a finding clears the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiAction {
    /// Refuse the request.
    #[default]
    Block,
    /// Redact the spans and let the request proceed.
    Mask,
}

static RECOGNIZER_PATTERNS: Lazy<Vec<(&'static str, Regex, f64)>> = Lazy::new(|| {
    // Patterns are constants validated by tests; failures are dropped.
    [
        (
            "EMAIL_ADDRESS",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            1.0,
        ),
        (
            "CREDIT_CARD",
            r"\b(?:\d[ -]?){13,16}\b",
            1.0,
        ),
        (
            "US_SSN",
            r"\b\d{3}-\d{2}-\d{4}\b",
            0.85,
        ),
        (
            "PHONE_NUMBER",
            r"\b(?:\+?\d{1,3}[ .-]?)?\(?\d{3}\)?[ .-]?\d{3}[ .-]?\d{4}\b",
            0.7,
        ),
        (
            "IP_ADDRESS",
            r"\b(?:\d{1,3}\.){3}\d{1,3}\b",
            0.6,
        ),
        (
            "IBAN_CODE",
            r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b",
            0.8,
        ),
    ]
    .into_iter()
    .filter_map(|(name, pattern, conf)| Regex::new(pattern).ok().map(|re| (name, re, conf)))
    .collect()
});

/// Regex-backed recognizer with fixed per-type confidences.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexEntityRecognizer;

#[async_trait]
impl EntityRecognizer for RegexEntityRecognizer {
    async fn analyze(&self, text: &str) -> GatewayResult<Vec<EntityFinding>> {
        let mut findings = Vec::new();
        for (entity_type, regex, confidence) in RECOGNIZER_PATTERNS.iter() {
            for m in regex.find_iter(text) {
                findings.push(EntityFinding {
                    entity_type: (*entity_type).to_string(),
                    start: m.start(),
                    end: m.end(),
                    confidence: *confidence,
                });
            }
        }
        Ok(findings)
    }
}

/// Detects personal data in prompts and responses.
pub struct PiiGuard {
    recognizer: Arc<dyn EntityRecognizer>,
    threshold: f64,
    action: PiiAction,
    mask_char: char,
}

impl PiiGuard {
    /// Guard over the given recognizer with explicit threshold and action.
    #[must_use]
    pub fn new(recognizer: Arc<dyn EntityRecognizer>, threshold: f64, action: PiiAction) -> Self {
        Self {
            recognizer,
            threshold: threshold.clamp(0.0, 1.0),
            action,
            mask_char: '*',
        }
    }

    /// Guard with the built-in regex recognizer, threshold 0.8, block mode.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(RegexEntityRecognizer), 0.8, PiiAction::Block)
    }

    /// Change the redaction character.
    #[must_use]
    pub fn with_mask_char(mut self, mask_char: char) -> Self {
        self.mask_char = mask_char;
        self
    }

    /// Findings at or above the threshold, ordered by confidence descending
    /// then start offset ascending.
    fn qualifying(&self, mut findings: Vec<EntityFinding>) -> Vec<EntityFinding> {
        findings.retain(|f| f.confidence >= self.threshold);
        findings.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.start.cmp(&b.start))
        });
        findings
    }

    /// Qualifying entity types, first occurrence order, deduplicated.
    fn entity_types(findings: &[EntityFinding]) -> Vec<String> {
        let mut types = Vec::new();
        for f in findings {
            if !types.iter().any(|t| t == &f.entity_type) {
                types.push(f.entity_type.clone());
            }
        }
        types
    }

    /// Redact the findings in `text`. Overlapping spans are resolved
    /// greedily in the qualifying order: a span is kept only if it does not
    /// intersect an already-kept span. Each kept span is replaced by one
    /// mask character per original character.
    fn mask_text(&self, text: &str, findings: &[EntityFinding]) -> String {
        let mut kept: Vec<&EntityFinding> = Vec::new();
        for f in findings {
            if f.end <= text.len() && !kept.iter().any(|k| f.start < k.end && k.start < f.end) {
                kept.push(f);
            }
        }
        kept.sort_by(|a, b| b.start.cmp(&a.start));
        let mut out = text.to_string();
        for f in kept {
            if !out.is_char_boundary(f.start) || !out.is_char_boundary(f.end) {
                continue;
            }
            let width = out[f.start..f.end].chars().count();
            let replacement: String = std::iter::repeat(self.mask_char).take(width).collect();
            out.replace_range(f.start..f.end, &replacement);
        }
        out
    }

    async fn evaluate(&self, text: &str, action: PiiAction) -> GatewayResult<GuardOutput> {
        let findings = self.qualifying(self.recognizer.analyze(text).await?);
        let Some(top) = findings.first().cloned() else {
            return Ok(GuardOutput::allow(GUARD_NAME));
        };
        let entity_types = Self::entity_types(&findings);
        match action {
            PiiAction::Block => {
                let verdict = GuardVerdict::block(
                    GUARD_NAME,
                    format!("high-confidence personal data: {}", top.entity_type),
                    top.confidence,
                )
                .with_detail(VerdictDetail {
                    entity_types,
                    ..VerdictDetail::default()
                });
                Ok(GuardOutput::from_verdict(verdict))
            }
            PiiAction::Mask => {
                let masked = self.mask_text(text, &findings);
                let verdict = GuardVerdict::masked(
                    GUARD_NAME,
                    format!("redacted personal data: {}", entity_types.join(", ")),
                    top.confidence,
                )
                .with_detail(VerdictDetail {
                    entity_types,
                    ..VerdictDetail::default()
                });
                Ok(GuardOutput::masked(verdict, masked))
            }
        }
    }
}

#[async_trait]
impl Guard for PiiGuard {
    fn name(&self) -> &str {
        GUARD_NAME
    }

    async fn on_request(&self, ctx: &RequestContext) -> GatewayResult<GuardOutput> {
        self.evaluate(ctx.prompt(), self.action).await
    }

    /// Responses are never refused for personal data; the guard always
    /// redacts on this stage regardless of the configured request action.
    async fn on_response(&self, _ctx: &RequestContext, text: &str) -> GatewayResult<GuardOutput> {
        self.evaluate(text, PiiAction::Mask).await
    }
}
