//! Routing tiers and dispatch retry behavior through the HTTP surface.

use crate::helpers::*;
use crate::mock_backend::{MockBackend, MockStep};
use aegis_core::GatewayError;
use axum::http::StatusCode;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn default_tier_routes_to_default_provider() {
    init_tracing();
    let primary = MockBackend::new("primary");
    let secondary = MockBackend::new("secondary");
    let (_state, router) = test_app(base_config(), vec![primary.clone(), secondary.clone()]);

    let (_, body) = post_chat(&router, "plain request", &[]).await;

    assert_eq!(body["provider"], "primary");
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 0);
}

#[tokio::test]
async fn group_tier_beats_default() {
    init_tracing();
    let primary = MockBackend::new("primary");
    let secondary = MockBackend::new("secondary");
    let (_state, router) = test_app(base_config(), vec![primary.clone(), secondary.clone()]);

    let (_, body) = post_chat(&router, "plain request", &[("x-group-id", "team-a")]).await;

    assert_eq!(body["provider"], "secondary");
    assert_eq!(secondary.calls(), 1);
    assert_eq!(primary.calls(), 0);
}

#[tokio::test]
async fn override_tier_beats_group_and_default() {
    init_tracing();
    let primary = MockBackend::new("primary");
    let secondary = MockBackend::new("secondary");
    let (_state, router) = test_app(base_config(), vec![primary.clone(), secondary.clone()]);

    let (_, body) = post_chat(
        &router,
        "plain request",
        &[
            ("x-group-id", "team-a"),
            ("x-llm-provider", "primary"),
            ("x-llm-model", "special-model"),
        ],
    )
    .await;

    assert_eq!(body["provider"], "primary");
    assert_eq!(body["model"], "special-model");
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 0);
}

#[tokio::test]
async fn incomplete_override_falls_through_to_group() {
    init_tracing();
    let primary = MockBackend::new("primary");
    let secondary = MockBackend::new("secondary");
    let (_state, router) = test_app(base_config(), vec![primary.clone(), secondary.clone()]);

    let (_, body) = post_chat(
        &router,
        "plain request",
        &[("x-group-id", "team-a"), ("x-llm-provider", "primary")],
    )
    .await;

    assert_eq!(body["provider"], "secondary");
}

#[tokio::test]
async fn unknown_override_falls_back_to_default() {
    init_tracing();
    let primary = MockBackend::new("primary");
    let (_state, router) = test_app(base_config(), vec![primary.clone()]);

    let (_, body) = post_chat(
        &router,
        "plain request",
        &[("x-llm-provider", "nonexistent"), ("x-llm-model", "m")],
    )
    .await;

    assert_eq!(body["provider"], "primary");
}

#[tokio::test]
async fn transient_failures_are_retried_to_success() {
    init_tracing();
    let backend = MockBackend::scripted(
        "primary",
        vec![
            MockStep::Fail(GatewayError::provider_upstream(
                "primary",
                "backend busy",
                Some(503),
                true,
            )),
            MockStep::Fail(GatewayError::provider_upstream(
                "primary",
                "backend busy",
                Some(503),
                true,
            )),
            MockStep::Reply("third time lucky".to_string()),
        ],
    );
    let (_state, router) = test_app(base_config(), vec![backend.clone()]);

    let (status, body) = post_chat(&router, "retry this", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flag"], "safe");
    assert_eq!(body["response"], "third time lucky");
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn non_retryable_failure_is_not_retried() {
    init_tracing();
    let backend = MockBackend::scripted(
        "primary",
        vec![MockStep::Fail(GatewayError::provider_upstream(
            "primary",
            "credential rejected",
            Some(401),
            false,
        ))],
    );
    let (_state, router) = test_app(base_config(), vec![backend.clone()]);

    let (status, body) = post_chat(&router, "fail once", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flag"], "llm_error");
    assert!(body["reason"].as_str().is_some());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn exhausted_retries_return_llm_error() {
    init_tracing();
    let busy = || {
        MockStep::Fail(GatewayError::provider_upstream(
            "primary",
            "backend busy",
            Some(503),
            true,
        ))
    };
    let backend = MockBackend::scripted("primary", vec![busy(), busy(), busy()]);
    let (_state, router) = test_app(base_config(), vec![backend.clone()]);

    let (status, body) = post_chat(&router, "always failing", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flag"], "llm_error");
    assert_eq!(backend.calls(), 3);
    // Upstream detail never leaks to the client.
    assert_eq!(body["reason"], "upstream provider unavailable");
}

#[tokio::test]
async fn llm_error_is_not_cached() {
    init_tracing();
    let backend = MockBackend::scripted(
        "primary",
        vec![
            MockStep::Fail(GatewayError::provider_upstream(
                "primary",
                "bad request",
                Some(400),
                false,
            )),
            MockStep::Reply("recovered".to_string()),
        ],
    );
    let (_state, router) = test_app(base_config(), vec![backend.clone()]);

    let (_, first) = post_chat(&router, "same prompt", &[]).await;
    let (_, second) = post_chat(&router, "same prompt", &[]).await;

    assert_eq!(first["flag"], "llm_error");
    assert_eq!(second["flag"], "safe");
    assert_eq!(second["cache_hit"], false);
    assert_eq!(backend.calls(), 2);
}
