//! Configuration model and loader.
//!
//! Configuration is read once at startup from a YAML file, selected
//! environment variables are layered on top, and the result is validated.
//! A [`ConfigError`] here is fatal: the gateway refuses to start rather
//! than run with a half-valid setup. Nothing in this crate is consulted
//! again at request time.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod model;

pub use error::ConfigError;
pub use model::{
    AuthConfig, CacheConfig, CustomRuleConfig, GatewayConfig, GuardAction, GuardsConfig,
    LimitsConfig, LoggingConfig, PatternGuardConfig, PiiGuardConfig, ProviderEntry, RoutingConfig,
    ServerConfig, WebhookConfig, WebhookMode,
};
