//! Helpers for driving the gateway router in-process.

use crate::mock_backend::MockBackend;
use aegis_config::{GatewayConfig, ProviderEntry, WebhookConfig};
use aegis_core::{BackoffPolicy, CompletionBackend, ProviderProfile};
use aegis_server::{build_router, hash_api_key, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tracing_subscriber::EnvFilter;

/// API key accepted by every test state.
pub const TEST_API_KEY: &str = "integration-test-key";

static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

fn test_profile(name: &str) -> ProviderEntry {
    ProviderEntry {
        kind: "ollama".to_string(),
        profile: ProviderProfile::new(name, "http://127.0.0.1:1", "test-model")
            .with_timeout(Duration::from_millis(200))
            .with_max_retries(3)
            .with_backoff(BackoffPolicy::Fixed {
                delay: Duration::from_millis(1),
            }),
    }
}

/// Two providers, `primary` as the default and `secondary` mapped to
/// group `team-a`. Cache on, no rate limit, no webhook.
pub fn base_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config
        .auth
        .api_key_hashes
        .push(hash_api_key(TEST_API_KEY));
    config.providers = vec![test_profile("primary"), test_profile("secondary")];
    config.routing.default_provider = "primary".to_string();
    config
        .routing
        .groups
        .insert("team-a".to_string(), "secondary".to_string());
    config
}

/// Attach a wiremock validator to a config.
pub fn with_webhook(mut config: GatewayConfig, url: String, mode: aegis_config::WebhookMode) -> GatewayConfig {
    config.webhook = Some(WebhookConfig {
        url,
        secret_env: "AEGIS_TEST_WEBHOOK_SECRET".to_string(),
        mode,
        timeout: Duration::from_millis(500),
        max_attempts: 2,
    });
    config
}

/// Build the router with mock backends swapped in under the configured
/// provider names.
pub fn test_app(
    config: GatewayConfig,
    backends: Vec<Arc<MockBackend>>,
) -> (Arc<AppState>, Router) {
    config.validate().expect("test config must validate");
    let mut state = AppState::from_config(config).expect("state assembly");
    for backend in backends {
        state
            .registry
            .register(backend as Arc<dyn CompletionBackend>);
    }
    let state = Arc::new(state);
    let router = build_router(Arc::clone(&state));
    (state, router)
}

/// `POST /chat` with the standard test key plus any extra headers.
pub async fn post_chat(
    router: &Router,
    prompt: &str,
    extra_headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let body = serde_json::json!({ "prompt": prompt });
    let mut request = Request::builder()
        .method("POST")
        .uri("/chat")
        .header("content-type", "application/json")
        .header("x-api-key", TEST_API_KEY);
    for (name, value) in extra_headers {
        request = request.header(*name, *value);
    }
    let request = request
        .body(Body::from(body.to_string()))
        .expect("request build");

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router call");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body read");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

/// `GET` a path and decode the JSON body.
pub async fn get_json(router: &Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(path)
        .body(Body::empty())
        .expect("request build");
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router call");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body read");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}
