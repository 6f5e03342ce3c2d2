//! The typed configuration tree.

use crate::error::ConfigError;
use aegis_core::ProviderProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Caller authentication.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Guard chain settings.
    #[serde(default)]
    pub guards: GuardsConfig,

    /// Configured backends.
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,

    /// Routing tiers.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// External validator webhook. Absent means the webhook stage is off.
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,

    /// Response cache.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Request bounds and rate limiting.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whole-request deadline enforced by the HTTP layer.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Caller authentication.
///
/// Keys are stored as SHA-256 hex digests; the file never holds raw keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Accepted key digests.
    #[serde(default)]
    pub api_key_hashes: Vec<String>,
}

/// Guard chain settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardsConfig {
    /// Pattern guard.
    #[serde(default)]
    pub pattern: PatternGuardConfig,

    /// PII guard.
    #[serde(default)]
    pub pii: PiiGuardConfig,
}

/// Pattern guard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternGuardConfig {
    /// Whether the guard runs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Chain priority; lower runs first.
    #[serde(default = "default_pattern_priority")]
    pub priority: i32,

    /// Organization-specific rules appended after the built-in table.
    #[serde(default)]
    pub custom_rules: Vec<CustomRuleConfig>,
}

impl Default for PatternGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: default_pattern_priority(),
            custom_rules: Vec::new(),
        }
    }
}

/// One organization rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomRuleConfig {
    /// Stable rule id, surfaced in verdicts.
    pub id: String,
    /// Case-insensitive regular expression.
    pub pattern: String,
}

/// What a guard does when detection clears its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardAction {
    /// Refuse the request.
    #[default]
    Block,
    /// Redact and proceed.
    Mask,
}

/// PII guard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiGuardConfig {
    /// Whether the guard runs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Chain priority; lower runs first.
    #[serde(default = "default_pii_priority")]
    pub priority: i32,

    /// Minimum recognizer confidence that triggers the action.
    #[serde(default = "default_pii_threshold")]
    pub threshold: f64,

    /// Request-stage action. Responses are always masked.
    #[serde(default)]
    pub action: GuardAction,
}

impl Default for PiiGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: default_pii_priority(),
            threshold: default_pii_threshold(),
            action: GuardAction::Block,
        }
    }
}

/// One configured backend: the wire protocol plus the profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Wire protocol: `openai` or `ollama`.
    pub kind: String,

    /// Dispatch profile.
    #[serde(flatten)]
    pub profile: ProviderProfile,
}

/// Routing tiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Provider used when no override or group applies.
    #[serde(default)]
    pub default_provider: String,

    /// Group id to provider name.
    #[serde(default)]
    pub groups: HashMap<String, String>,
}

/// Webhook failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookMode {
    /// Responder failures are logged and ignored.
    #[default]
    BestEffort,
    /// Responder denial or unreachability blocks the request.
    FailClosed,
}

/// External validator webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Responder URL.
    pub url: String,

    /// Environment variable holding the shared HMAC secret.
    pub secret_env: String,

    /// Failure policy.
    #[serde(default)]
    pub mode: WebhookMode,

    /// Per-call timeout.
    #[serde(default = "default_webhook_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Attempt budget per consultation.
    #[serde(default = "default_webhook_attempts")]
    pub max_attempts: u32,
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether safe responses are cached.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entry lifetime.
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub ttl: Duration,

    /// Upper bound on resident entries.
    #[serde(default = "default_cache_capacity")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: default_cache_ttl(),
            max_entries: default_cache_capacity(),
        }
    }
}

/// Request bounds and rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum prompt length in characters.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,

    /// Per-key requests per minute. Absent means unlimited.
    #[serde(default)]
    pub rate_per_minute: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: default_max_prompt_chars(),
            rate_per_minute: None,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value functions

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_pattern_priority() -> i32 {
    10
}

fn default_pii_priority() -> i32 {
    20
}

fn default_pii_threshold() -> f64 {
    0.8
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_webhook_attempts() -> u32 {
    2
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_max_prompt_chars() -> usize {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl GatewayConfig {
    /// Load from a YAML file, apply environment overrides, validate.
    ///
    /// # Errors
    /// Any I/O, parse, or validation failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_yaml(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse from a YAML string without validation.
    ///
    /// # Errors
    /// Any parse failure.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Layer `AEGIS_*` environment variables over the file values.
    ///
    /// Unparseable values are ignored rather than fatal; the file value
    /// stands.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("AEGIS_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("AEGIS_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(level) = std::env::var("AEGIS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(provider) = std::env::var("AEGIS_DEFAULT_PROVIDER") {
            self.routing.default_provider = provider;
        }
        if let Ok(url) = std::env::var("AEGIS_WEBHOOK_URL") {
            if let Some(webhook) = &mut self.webhook {
                webhook.url = url;
            }
        }
    }

    /// Check internal consistency.
    ///
    /// # Errors
    /// The first inconsistency found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.api_key_hashes.is_empty() {
            return Err(ConfigError::invalid("auth.api_key_hashes must not be empty"));
        }
        for hash in &self.auth.api_key_hashes {
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::invalid(format!(
                    "auth.api_key_hashes entry '{}' is not a SHA-256 hex digest",
                    truncate(hash)
                )));
            }
        }

        if self.providers.is_empty() {
            return Err(ConfigError::invalid("at least one provider is required"));
        }
        for entry in &self.providers {
            if !matches!(entry.kind.as_str(), "openai" | "ollama") {
                return Err(ConfigError::invalid(format!(
                    "provider '{}' has unknown kind '{}'",
                    entry.profile.name, entry.kind
                )));
            }
            if entry.profile.endpoint.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "provider '{}' has an empty endpoint",
                    entry.profile.name
                )));
            }
        }

        let known: Vec<&str> = self.providers.iter().map(|e| e.profile.name.as_str()).collect();
        if !known.contains(&self.routing.default_provider.as_str()) {
            return Err(ConfigError::invalid(format!(
                "routing.default_provider '{}' is not a configured provider",
                self.routing.default_provider
            )));
        }
        for (group, provider) in &self.routing.groups {
            if !known.contains(&provider.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "routing.groups['{group}'] references unknown provider '{provider}'"
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.guards.pii.threshold) {
            return Err(ConfigError::invalid(
                "guards.pii.threshold must be within [0.0, 1.0]",
            ));
        }
        for rule in &self.guards.pattern.custom_rules {
            regex::RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    ConfigError::invalid(format!("custom rule '{}' is invalid: {e}", rule.id))
                })?;
        }

        if self.limits.max_prompt_chars == 0 {
            return Err(ConfigError::invalid("limits.max_prompt_chars must be positive"));
        }
        if let Some(webhook) = &self.webhook {
            if webhook.url.is_empty() {
                return Err(ConfigError::invalid("webhook.url must not be empty"));
            }
            if webhook.secret_env.is_empty() {
                return Err(ConfigError::invalid("webhook.secret_env must not be empty"));
            }
        }
        Ok(())
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() > 12 {
        let head: String = s.chars().take(12).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}
