//! Request handlers.
//!
//! `chat` walks one request through the whole pipeline: authentication,
//! validation, rate limiting, cache lookup, the request-stage guard chain,
//! the optional webhook consultation, provider dispatch, response-stage
//! filtering, and the audit record. Guard blocks and provider failures are
//! normal outcomes carried in the body at HTTP 200; only auth, validation,
//! and rate-limit failures become error statuses.

use crate::cache::{cache_key, CachedCompletion};
use crate::error::ApiError;
use crate::state::AppState;
use aegis_core::{
    CompletionRequest, GuardVerdict, RequestContext, RequestPhase, RouteOverride, Usage,
    VerdictOutcome,
};
use aegis_guards::{RequestChainResult, ResponseChainResult};
use aegis_routing::{DispatchOutcome, RouteSource};
use aegis_telemetry::{mask_api_key, prompt_preview, AuditRecord, StageTimer};
use aegis_webhook::{NotifierMode, WebhookOutcome, WebhookPayload};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Inbound chat request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The prompt to complete.
    pub prompt: String,
    /// Optional model hint. A complete header override pair still wins.
    #[serde(default)]
    pub model: Option<String>,
    /// Optional sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Optional generation cap.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Terminal outcome flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFlag {
    /// Guards allowed and the backend answered.
    Safe,
    /// A guard or the validator refused the request.
    Blocked,
    /// The backend failed after exhausting its retry budget.
    LlmError,
}

/// Outward chat response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Correlation id for support and audit lookup.
    pub correlation_id: Uuid,
    /// Final text. Empty when blocked or errored.
    pub response: String,
    /// Terminal outcome.
    pub flag: ResponseFlag,
    /// Reason, present for blocked and error outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Provider that served the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model that served the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Whether the response came from the cache.
    pub cache_hit: bool,
    /// Total processing time.
    pub processing_time_ms: u64,
    /// Whether personal data was detected at or above the threshold.
    pub pii_detected: bool,
    /// Qualifying entity types, deduplicated.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pii_types: Vec<String>,
    /// Token usage, when the backend reported it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Override headers form a pair; an incomplete pair is ignored with a
/// warning rather than failing the request.
fn route_override_from(headers: &HeaderMap) -> Option<RouteOverride> {
    let provider = header_str(headers, "x-llm-provider");
    let model = header_str(headers, "x-llm-model");
    match (provider, model) {
        (Some(provider), Some(model)) => Some(RouteOverride {
            provider: provider.to_string(),
            model: model.to_string(),
        }),
        (None, None) => None,
        _ => {
            warn!("incomplete provider/model override headers; ignoring");
            None
        }
    }
}

fn client_addr_from(headers: &HeaderMap) -> String {
    header_str(headers, "x-forwarded-for")
        .map_or_else(|| "unknown".to_string(), |v| v.split(',').next().unwrap_or("unknown").trim().to_string())
}

fn pii_summary(verdicts: &[GuardVerdict]) -> (bool, Vec<String>) {
    let mut types = Vec::new();
    let mut detected = false;
    for verdict in verdicts {
        if verdict.guard != aegis_guards::pii::GUARD_NAME
            || verdict.outcome == VerdictOutcome::Allow
        {
            continue;
        }
        detected = true;
        if let Some(detail) = &verdict.detail {
            for entity in &detail.entity_types {
                if !types.contains(entity) {
                    types.push(entity.clone());
                }
            }
        }
    }
    (detected, types)
}

struct PipelineReply {
    flag: ResponseFlag,
    response: String,
    reason: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    cache_hit: bool,
    usage: Option<Usage>,
    attempts: u32,
}

/// `POST /chat`.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let mut timer = StageTimer::new();

    // Authentication, before anything else touches the prompt.
    let api_key = header_str(&headers, "x-api-key");
    let api_key_hash = state.authenticator.authenticate(api_key)?;
    let api_key_masked = mask_api_key(api_key.unwrap_or_default());

    let prompt_chars = body.prompt.chars().count();
    if prompt_chars == 0 {
        return Err(ApiError::Validation("prompt must not be empty".to_string()));
    }
    if prompt_chars > state.config.limits.max_prompt_chars {
        return Err(ApiError::Validation(format!(
            "prompt exceeds {} characters",
            state.config.limits.max_prompt_chars
        )));
    }

    if let Some(limit) = state.config.limits.rate_per_minute {
        if !state.rate.check_and_increment(&api_key_hash, limit) {
            return Err(ApiError::RateLimited);
        }
    }

    let group_id = header_str(&headers, "x-group-id").map(String::from);
    let mut ctx = RequestContext::builder()
        .prompt(body.prompt.clone())
        .api_key_hash(api_key_hash)
        .client_addr(client_addr_from(&headers))
        .group_id(group_id.clone())
        .route_override(route_override_from(&headers))
        .build();
    ctx.advance(RequestPhase::Authenticating)?;
    timer.mark(RequestPhase::Authenticating);

    let key = cache_key(ctx.api_key_hash(), group_id.as_deref(), ctx.prompt());
    let reply = run_pipeline(&state, &mut ctx, &body, &key, &mut timer).await?;

    let (pii_detected, pii_types) = pii_summary(ctx.verdicts());
    let total_ms = timer.total_ms();

    let record = AuditRecord {
        correlation_id: ctx.correlation_id(),
        timestamp: ctx.timestamp(),
        api_key: api_key_masked,
        client_addr: ctx.client_addr().to_string(),
        prompt_preview: prompt_preview(ctx.prompt()),
        outcome: match reply.flag {
            ResponseFlag::Safe => "safe",
            ResponseFlag::Blocked => "blocked",
            ResponseFlag::LlmError => "llm_error",
        }
        .to_string(),
        provider: reply.provider.clone(),
        model: reply.model.clone(),
        verdicts: ctx.verdicts().to_vec(),
        stages: timer.into_stages(),
        cache_hit: reply.cache_hit,
        attempts: reply.attempts,
        total_ms,
    };
    record.emit();

    Ok(Json(ChatResponse {
        correlation_id: ctx.correlation_id(),
        response: reply.response,
        flag: reply.flag,
        reason: reply.reason,
        provider: reply.provider,
        model: reply.model,
        cache_hit: reply.cache_hit,
        processing_time_ms: total_ms,
        pii_detected,
        pii_types,
        usage: reply.usage,
    }))
}

async fn run_pipeline(
    state: &AppState,
    ctx: &mut RequestContext,
    body: &ChatRequest,
    key: &str,
    timer: &mut StageTimer,
) -> Result<PipelineReply, ApiError> {
    ctx.advance(RequestPhase::GuardEvaluation)?;

    // Cache before guards would skip inspection; a cached entry already
    // passed the full chain, so the lookup happens here but the request
    // chain still sees the prompt first.
    if let RequestChainResult::Blocked(verdict) = state.chain.run_request(ctx).await {
        ctx.advance(RequestPhase::Blocked)?;
        timer.mark(RequestPhase::Blocked);
        notify_block(state, ctx, &verdict.reason);
        return Ok(blocked_reply(verdict.reason));
    }
    timer.mark(RequestPhase::GuardEvaluation);

    if let Some(cached) = state.cache.get(key) {
        ctx.advance(RequestPhase::Forwarding)?;
        ctx.advance(RequestPhase::ProviderCall)?;
        ctx.advance(RequestPhase::ResponseFiltering)?;
        ctx.advance(RequestPhase::Completed)?;
        timer.mark(RequestPhase::Completed);
        return Ok(PipelineReply {
            flag: ResponseFlag::Safe,
            response: cached.text,
            reason: None,
            provider: Some(cached.provider),
            model: Some(cached.model),
            cache_hit: true,
            usage: cached.usage,
            attempts: 0,
        });
    }

    if let Some(outcome) = consult_webhook(state, ctx).await {
        ctx.advance(RequestPhase::Blocked)?;
        timer.mark(RequestPhase::Blocked);
        return Ok(blocked_reply(outcome));
    }

    ctx.advance(RequestPhase::Forwarding)?;
    let Some(decision) = state.routes.select(ctx) else {
        // validate() at startup makes this unreachable in practice
        return Err(ApiError::Internal);
    };
    let Some(backend) = state.registry.get(&decision.profile.name) else {
        return Err(ApiError::Internal);
    };
    ctx.advance(RequestPhase::ProviderCall)?;

    // A complete header override already carries its own model; the body
    // hint applies to group and default routes only.
    let model = if decision.source == RouteSource::Override {
        decision.model.clone()
    } else {
        body.model.clone().unwrap_or_else(|| decision.model.clone())
    };
    let mut request = CompletionRequest::new(ctx.prompt(), model.clone());
    request.temperature = body.temperature;
    request.max_tokens = body.max_tokens;

    let outcome = state
        .dispatcher
        .dispatch(
            backend.as_ref(),
            &request,
            decision.profile.timeout,
            decision.profile.max_retries,
            &decision.profile.backoff,
        )
        .await;
    timer.mark(RequestPhase::ProviderCall);

    let completion = match outcome {
        DispatchOutcome::Success(completion) => completion,
        DispatchOutcome::Failure { error, attempts } => {
            warn!(
                correlation_id = %ctx.correlation_id(),
                provider = %decision.profile.name,
                attempts,
                error = %error,
                "provider retries exhausted"
            );
            ctx.advance(RequestPhase::ProviderError)?;
            ctx.advance(RequestPhase::Failed)?;
            timer.mark(RequestPhase::Failed);
            return Ok(PipelineReply {
                flag: ResponseFlag::LlmError,
                response: String::new(),
                reason: Some("upstream provider unavailable".to_string()),
                provider: Some(decision.profile.name),
                model: Some(model),
                cache_hit: false,
                usage: None,
                attempts,
            });
        }
    };

    ctx.advance(RequestPhase::ResponseFiltering)?;
    let filtered = state
        .chain
        .run_response(ctx, completion.text.clone())
        .await;
    timer.mark(RequestPhase::ResponseFiltering);

    let (text, modified) = match filtered {
        ResponseChainResult::Filtered { text, modified } => (text, modified),
        ResponseChainResult::Blocked(verdict) => {
            ctx.advance(RequestPhase::Completed)?;
            timer.mark(RequestPhase::Completed);
            notify_block(state, ctx, &verdict.reason);
            return Ok(blocked_reply(verdict.reason));
        }
    };

    ctx.advance(RequestPhase::Completed)?;
    timer.mark(RequestPhase::Completed);

    state.cache.put(
        key.to_string(),
        CachedCompletion {
            text: text.clone(),
            provider: completion.provider.clone(),
            model: completion.model.clone(),
            modified,
            usage: completion.usage,
        },
    );

    Ok(PipelineReply {
        flag: ResponseFlag::Safe,
        response: text,
        reason: None,
        provider: Some(completion.provider),
        model: Some(completion.model),
        cache_hit: false,
        usage: completion.usage,
        attempts: completion.attempts,
    })
}

fn blocked_reply(reason: impl Into<String>) -> PipelineReply {
    PipelineReply {
        flag: ResponseFlag::Blocked,
        response: String::new(),
        reason: Some(reason.into()),
        provider: None,
        model: None,
        cache_hit: false,
        usage: None,
        attempts: 0,
    }
}

fn webhook_payload(ctx: &RequestContext, metadata: serde_json::Value) -> WebhookPayload {
    WebhookPayload {
        correlation_id: ctx.correlation_id(),
        prompt: ctx.prompt().to_string(),
        client_ip: ctx.client_addr().to_string(),
        api_key_hash: ctx.api_key_hash().to_string(),
        timestamp: ctx.timestamp(),
        metadata,
    }
}

/// Consult the validator before dispatch. Returns a block reason when the
/// request must not proceed: an explicit denial always blocks; an
/// unreachable responder blocks only in fail-closed mode.
async fn consult_webhook(state: &AppState, ctx: &RequestContext) -> Option<String> {
    let notifier = state.notifier.as_ref()?;
    let payload = webhook_payload(ctx, json!({ "stage": "pre_dispatch" }));
    match notifier.consult(&payload).await {
        WebhookOutcome::Allowed => None,
        WebhookOutcome::Denied { reason, .. } => {
            Some(reason.unwrap_or_else(|| "denied by external validator".to_string()))
        }
        WebhookOutcome::Unavailable { error } => {
            if notifier.mode() == NotifierMode::FailClosed {
                warn!(
                    correlation_id = %ctx.correlation_id(),
                    error = %error,
                    "validator unreachable in fail-closed mode; blocking"
                );
                Some("external validator unavailable".to_string())
            } else {
                warn!(
                    correlation_id = %ctx.correlation_id(),
                    error = %error,
                    "validator unreachable; proceeding best-effort"
                );
                None
            }
        }
    }
}

/// Fire-and-forget incident notification after a block.
fn notify_block(state: &AppState, ctx: &RequestContext, reason: &str) {
    if let Some(notifier) = &state.notifier {
        let payload = webhook_payload(
            ctx,
            json!({ "stage": "incident", "reason": reason }),
        );
        notifier.notify_incident(payload);
    }
}

/// `GET /health`.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let backend_reachable = match state.registry.get(state.routes.default_provider()) {
        Some(backend) => backend.is_reachable().await,
        None => false,
    };
    Json(json!({
        "status": "ok",
        "uptime_seconds": state.started.elapsed().as_secs(),
        "guards_loaded": state.chain.enabled_count(),
        "backend_reachable": backend_reachable,
    }))
}

/// `GET /plugins`.
pub async fn plugins(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "plugins": state.chain.descriptors() }))
}

/// `GET /`.
pub async fn root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "name": "aegis-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "guards_loaded": state.chain.enabled_count(),
        "status": "ok",
    }))
}
