//! Webhook ingestion and event status routes.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use aniquest_engine::models::{ReputationRecord, SyncEvent, SyncEventType, ViolationKind};
use aniquest_engine::{EngineError, StoreError};

use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::middleware::ClientIp;

/// Webhook envelope. Every field is optional so validation can name the
/// missing piece instead of surfacing a serde error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitEventRequest {
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub data: Option<serde_json::Value>,
    pub api_key: Option<String>,
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
        .into_response()
}

/// Accept one event from either platform and queue it for the opposite
/// consumer.
///
/// Authentication is a shared API key; a wrong key is recorded against the
/// caller's IP reputation. A valid submission is rate limited per user,
/// appended as `pending`, and acknowledged with 202 before any processing
/// happens.
pub async fn submit_event_handler(
    Extension(state): Extension<AppState>,
    client_ip: Option<Extension<ClientIp>>,
    Json(body): Json<SubmitEventRequest>,
) -> Response {
    let deps = &state.deps;

    if body.api_key.as_deref() != Some(deps.webhook_api_key.as_str()) {
        if let Some(Extension(ClientIp(ip))) = client_ip {
            let subject = ReputationRecord::ip_subject(ip);
            if let Err(err) = deps
                .sync
                .validator()
                .record_violation(
                    &subject,
                    ViolationKind::InvalidApiKey,
                    "webhook called with a missing or wrong API key",
                    None,
                )
                .await
            {
                tracing::warn!(error = %err, "failed to record API key violation");
            }
        }
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid API key" })),
        )
            .into_response();
    }

    let Some(type_name) = body.event_type.as_deref() else {
        return bad_request("eventType is required");
    };
    let Some(user_id) = body.user_id.as_deref() else {
        return bad_request("userId is required");
    };
    let Some(event_type) = SyncEventType::from_name(type_name) else {
        return bad_request(&format!("unknown event type {type_name}"));
    };

    let decision = deps.sync.limiter().check("webhook_ingest", user_id);
    if !decision.allowed {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "rate limit exceeded",
                "remaining": decision.remaining,
                "resetTime": decision.reset_at,
                "retryAfter": decision.retry_after_secs,
            })),
        )
            .into_response();
    }

    let event = SyncEvent::new(
        event_type,
        user_id,
        body.data.unwrap_or_else(|| json!({})),
        deps.clock.now(),
    );

    if let Err(err) = deps.sync.submit(&event).await {
        return ApiError(err).into_response();
    }

    deps.activity
        .record(
            user_id,
            "sync_event_created",
            event.source_platform,
            json!({ "eventId": event.id, "eventType": event.event_type.as_str() }),
        )
        .await;

    (
        StatusCode::ACCEPTED,
        Json(json!({ "eventId": event.id, "status": "pending" })),
    )
        .into_response()
}

/// Look up one event by id, any status.
pub async fn event_status_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncEvent>, ApiError> {
    let event = state
        .deps
        .stores
        .events
        .get(id)
        .await
        .map_err(EngineError::from)?;
    match event {
        Some(event) => Ok(Json(event)),
        None => Err(EngineError::from(StoreError::not_found("event", id.to_string())).into()),
    }
}
