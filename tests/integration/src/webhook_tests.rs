//! Signed-webhook validator behavior through the HTTP surface.

use crate::helpers::*;
use crate::mock_backend::MockBackend;
use aegis_config::WebhookMode;
use aegis_webhook::{verify_signature, SIGNATURE_HEADER};
use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET_ENV: &str = "AEGIS_TEST_WEBHOOK_SECRET";
const SECRET: &str = "integration-webhook-secret";

fn secret(value: &str) -> SecretString {
    SecretString::new(value.to_string())
}

fn install_secret() {
    std::env::set_var(SECRET_ENV, SECRET);
}

#[tokio::test]
async fn allowed_decision_lets_the_request_through() {
    init_tracing();
    install_secret();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "allowed": true })))
        .mount(&server)
        .await;

    let config = with_webhook(
        base_config(),
        format!("{}/validate", server.uri()),
        WebhookMode::BestEffort,
    );
    let backend = MockBackend::new("primary");
    let (_state, router) = test_app(config, vec![backend.clone()]);

    let (status, body) = post_chat(&router, "hello there", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flag"], "safe");
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn denied_decision_blocks_in_best_effort_mode() {
    init_tracing();
    install_secret();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "allowed": false,
            "reason": "policy violation",
            "confidence": 0.99,
        })))
        .mount(&server)
        .await;

    let config = with_webhook(
        base_config(),
        format!("{}/validate", server.uri()),
        WebhookMode::BestEffort,
    );
    let backend = MockBackend::new("primary");
    let (_state, router) = test_app(config, vec![backend.clone()]);

    let (status, body) = post_chat(&router, "hello there", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flag"], "blocked");
    assert_eq!(body["reason"], "policy violation");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn unreachable_responder_proceeds_in_best_effort_mode() {
    init_tracing();
    install_secret();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = with_webhook(
        base_config(),
        format!("{}/validate", server.uri()),
        WebhookMode::BestEffort,
    );
    let backend = MockBackend::new("primary");
    let (_state, router) = test_app(config, vec![backend.clone()]);

    let (status, body) = post_chat(&router, "hello there", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flag"], "safe");
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn unreachable_responder_blocks_in_fail_closed_mode() {
    init_tracing();
    install_secret();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = with_webhook(
        base_config(),
        format!("{}/validate", server.uri()),
        WebhookMode::FailClosed,
    );
    let backend = MockBackend::new("primary");
    let (_state, router) = test_app(config, vec![backend.clone()]);

    let (status, body) = post_chat(&router, "hello there", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flag"], "blocked");
    assert_eq!(body["reason"], "external validator unavailable");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn consult_request_carries_a_valid_signature() {
    init_tracing();
    install_secret();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "allowed": true })))
        .mount(&server)
        .await;

    let config = with_webhook(
        base_config(),
        format!("{}/validate", server.uri()),
        WebhookMode::BestEffort,
    );
    let (_state, router) = test_app(config, vec![MockBackend::new("primary")]);

    let (status, _) = post_chat(&router, "sign this consult", &[]).await;
    assert_eq!(status, StatusCode::OK);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let received = &requests[0];
    let signature = received
        .headers
        .get(SIGNATURE_HEADER)
        .expect("signature header present")
        .to_str()
        .unwrap();
    assert!(verify_signature(&secret(SECRET), &received.body, signature));

    // A single flipped byte invalidates the signature.
    let mut tampered = received.body.clone();
    tampered[0] ^= 0x01;
    assert!(!verify_signature(&secret(SECRET), &tampered, signature));
}

#[tokio::test]
async fn blocked_request_sends_incident_notification() {
    init_tracing();
    install_secret();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "allowed": true })))
        .mount(&server)
        .await;

    let config = with_webhook(
        base_config(),
        format!("{}/validate", server.uri()),
        WebhookMode::BestEffort,
    );
    let backend = MockBackend::new("primary");
    let (_state, router) = test_app(config, vec![backend.clone()]);

    let (status, body) = post_chat(&router, "DROP TABLE users; --", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flag"], "blocked");
    assert_eq!(backend.calls(), 0);

    // The incident notification is fire-and-forget; give it a moment.
    let mut notified = false;
    for _ in 0..50 {
        if !server.received_requests().await.unwrap().is_empty() {
            notified = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(notified, "incident notification never arrived");
}
