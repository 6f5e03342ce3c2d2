//! Shared application state, assembled once at startup.

use crate::auth::Authenticator;
use crate::cache::ResponseCache;
use aegis_config::{GatewayConfig, GuardAction, WebhookMode};
use aegis_core::{
    AtomicRateCounter, GatewayError, GatewayResult, Guard, GuardCapability, PluginDescriptor,
    RateCounter,
};
use aegis_guards::{ChainExecutor, PatternGuard, PatternTable, PiiAction, PiiGuard};
use aegis_providers::{build_backend, BackendRegistry, ProviderKind};
use aegis_routing::{Dispatcher, RouteTable};
use aegis_webhook::{NotifierMode, WebhookNotifier};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Everything request handlers need, built once from configuration.
pub struct AppState {
    /// Validated configuration.
    pub config: GatewayConfig,
    /// Guard chain in priority order.
    pub chain: ChainExecutor,
    /// Routing tiers.
    pub routes: RouteTable,
    /// Constructed backends by profile name.
    pub registry: BackendRegistry,
    /// Timeout/retry/backoff executor.
    pub dispatcher: Dispatcher,
    /// External validator, when configured.
    pub notifier: Option<Arc<WebhookNotifier>>,
    /// API-key validation.
    pub authenticator: Authenticator,
    /// Safe-response cache.
    pub cache: ResponseCache,
    /// Per-key request counter.
    pub rate: Arc<dyn RateCounter>,
    /// Process start, for uptime reporting.
    pub started: Instant,
}

impl AppState {
    /// Assemble the state from a validated configuration.
    ///
    /// # Errors
    /// Any construction failure: unknown provider kind, unset credential
    /// variable, uncompilable custom rule.
    pub fn from_config(config: GatewayConfig) -> GatewayResult<Self> {
        let chain = build_chain(&config)?;
        let (routes, registry) = build_routing(&config)?;
        let notifier = build_notifier(&config)?;

        let authenticator = Authenticator::new(config.auth.api_key_hashes.iter().cloned());
        let cache = ResponseCache::new(
            config.cache.enabled,
            config.cache.ttl,
            config.cache.max_entries,
        );

        info!(
            guards = chain.enabled_count(),
            providers = registry.len(),
            webhook = notifier.is_some(),
            cache = config.cache.enabled,
            "gateway state assembled"
        );

        Ok(Self {
            config,
            chain,
            routes,
            registry,
            dispatcher: Dispatcher::default(),
            notifier,
            authenticator,
            cache,
            rate: Arc::new(AtomicRateCounter::new()),
            started: Instant::now(),
        })
    }
}

fn build_chain(config: &GatewayConfig) -> GatewayResult<ChainExecutor> {
    let mut entries: Vec<(PluginDescriptor, Arc<dyn Guard>)> = Vec::new();

    let pattern = &config.guards.pattern;
    let mut table = PatternTable::builtin();
    for rule in &pattern.custom_rules {
        table.add_custom_rule(&rule.id, &rule.pattern).map_err(|e| {
            GatewayError::config(format!("custom rule '{}' failed to compile: {e}", rule.id))
        })?;
    }
    entries.push((
        PluginDescriptor::new(aegis_guards::pattern::GUARD_NAME, pattern.priority)
            .with_capabilities(vec![GuardCapability::OnRequest])
            .with_enabled(pattern.enabled),
        Arc::new(PatternGuard::new(table)),
    ));

    let pii = &config.guards.pii;
    let action = match pii.action {
        GuardAction::Block => PiiAction::Block,
        GuardAction::Mask => PiiAction::Mask,
    };
    entries.push((
        PluginDescriptor::new(aegis_guards::pii::GUARD_NAME, pii.priority)
            .with_enabled(pii.enabled),
        Arc::new(PiiGuard::new(
            Arc::new(aegis_guards::RegexEntityRecognizer),
            pii.threshold,
            action,
        )),
    ));

    Ok(ChainExecutor::new(entries))
}

fn build_routing(config: &GatewayConfig) -> GatewayResult<(RouteTable, BackendRegistry)> {
    let mut registry = BackendRegistry::new();
    let mut profiles = Vec::with_capacity(config.providers.len());
    for entry in &config.providers {
        let kind: ProviderKind = entry.kind.parse()?;
        registry.register(build_backend(kind, &entry.profile)?);
        profiles.push(entry.profile.clone());
    }

    let routes = RouteTable::new(
        profiles,
        config.routing.groups.clone(),
        config.routing.default_provider.clone(),
    );
    routes.validate().map_err(|dangling| {
        GatewayError::config(format!("dangling route references: {}", dangling.join(", ")))
    })?;
    Ok((routes, registry))
}

fn build_notifier(config: &GatewayConfig) -> GatewayResult<Option<Arc<WebhookNotifier>>> {
    let Some(webhook) = &config.webhook else {
        return Ok(None);
    };
    let secret = std::env::var(&webhook.secret_env).map(SecretString::new).map_err(|_| {
        GatewayError::config(format!(
            "webhook secret variable '{}' is not set",
            webhook.secret_env
        ))
    })?;
    let mode = match webhook.mode {
        WebhookMode::BestEffort => NotifierMode::BestEffort,
        WebhookMode::FailClosed => NotifierMode::FailClosed,
    };
    let notifier = WebhookNotifier::new(
        webhook.url.clone(),
        secret,
        mode,
        webhook.timeout,
        webhook.max_attempts,
    )?;
    Ok(Some(Arc::new(notifier)))
}
