//! Per-request audit records.
//!
//! One structured event per request, emitted at completion regardless of
//! outcome. Records never contain raw API keys or full prompts; the key is
//! masked and the prompt truncated to a preview. Storage beyond the log
//! stream is out of scope.

use aegis_core::{GuardVerdict, RequestPhase};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Maximum characters kept in the prompt preview.
const PREVIEW_CHARS: usize = 80;

/// Mask an API key for logging: asterisks plus the final six characters.
#[must_use]
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 6 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("****{tail}")
}

/// Truncate a prompt to a char-safe preview.
#[must_use]
pub fn prompt_preview(prompt: &str) -> String {
    if prompt.chars().count() <= PREVIEW_CHARS {
        return prompt.to_string();
    }
    let cut: String = prompt.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}

/// Elapsed time spent in one lifecycle stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    /// Stage name.
    pub stage: String,
    /// Milliseconds spent in the stage.
    pub elapsed_ms: u64,
}

/// Accumulates per-stage timings as the pipeline advances.
#[derive(Debug)]
pub struct StageTimer {
    started: Instant,
    last: Instant,
    stages: Vec<StageTiming>,
}

impl Default for StageTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTimer {
    /// Start the clock.
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last: now,
            stages: Vec::new(),
        }
    }

    /// Close out the stage that just finished.
    pub fn mark(&mut self, phase: RequestPhase) {
        let now = Instant::now();
        self.stages.push(StageTiming {
            stage: phase.to_string(),
            elapsed_ms: now.duration_since(self.last).as_millis() as u64,
        });
        self.last = now;
    }

    /// Total wall-clock time since construction, in milliseconds.
    #[must_use]
    pub fn total_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Consume the timer, yielding the recorded stages.
    #[must_use]
    pub fn into_stages(self) -> Vec<StageTiming> {
        self.stages
    }
}

/// The audit record for one request.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Correlation id shared with the webhook envelope and response.
    pub correlation_id: Uuid,
    /// When the request was received.
    pub timestamp: DateTime<Utc>,
    /// Masked API key.
    pub api_key: String,
    /// Client address.
    pub client_addr: String,
    /// Truncated prompt.
    pub prompt_preview: String,
    /// Terminal outcome flag: `safe`, `blocked`, or `llm_error`.
    pub outcome: String,
    /// Provider that served the request, when dispatch happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model that served the request, when dispatch happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Ordered verdict chain.
    pub verdicts: Vec<GuardVerdict>,
    /// Per-stage timings.
    pub stages: Vec<StageTiming>,
    /// Whether the response came from the cache.
    pub cache_hit: bool,
    /// Backend attempts consumed.
    pub attempts: u32,
    /// Total processing time in milliseconds.
    pub total_ms: u64,
}

impl AuditRecord {
    /// Emit the record as a structured log event.
    pub fn emit(&self) {
        let detail = serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"));
        info!(
            target: "aegis::audit",
            correlation_id = %self.correlation_id,
            outcome = %self.outcome,
            cache_hit = self.cache_hit,
            attempts = self.attempts,
            total_ms = self.total_ms,
            audit = %detail,
            "request completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_last_six() {
        assert_eq!(mask_api_key("sk-abcdef123456"), "****123456");
    }

    #[test]
    fn short_keys_are_fully_masked() {
        assert_eq!(mask_api_key("abc"), "***");
        assert_eq!(mask_api_key(""), "");
    }

    #[test]
    fn preview_truncates_long_prompts() {
        let long = "x".repeat(200);
        let preview = prompt_preview(&long);
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn preview_keeps_short_prompts_intact() {
        assert_eq!(prompt_preview("hello"), "hello");
    }

    #[test]
    fn preview_respects_multibyte_boundaries() {
        let prompt = "é".repeat(100);
        let preview = prompt_preview(&prompt);
        assert!(preview.starts_with('é'));
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn timer_records_stages_in_order() {
        let mut timer = StageTimer::new();
        timer.mark(RequestPhase::Authenticating);
        timer.mark(RequestPhase::GuardEvaluation);
        let stages = timer.into_stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].stage, "authenticating");
        assert_eq!(stages[1].stage, "guard_evaluation");
    }

    #[test]
    fn record_serializes_without_raw_key() {
        let record = AuditRecord {
            correlation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            api_key: mask_api_key("sk-secret-key-123456"),
            client_addr: "10.0.0.1".to_string(),
            prompt_preview: prompt_preview("hello"),
            outcome: "safe".to_string(),
            provider: Some("ollama".to_string()),
            model: Some("mistral".to_string()),
            verdicts: vec![GuardVerdict::allow("pattern_guard")],
            stages: Vec::new(),
            cache_hit: false,
            attempts: 1,
            total_ms: 12,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(json.contains("****123456"));
    }
}
