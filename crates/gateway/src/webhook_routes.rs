//! Fallback HTTP intake for inbound messages.
//!
//! `POST /webhook/incoming` lets an upstream system hand a message to the
//! pipeline directly, bypassing the live transport. Events arriving here get
//! a synthetic external id, so they never collide with transport dedup keys.

use {
    axum::{Json, extract::State, http::StatusCode, response::IntoResponse},
    serde::Deserialize,
    tracing::error,
    uuid::Uuid,
};

use {
    courier_common::MessageKind,
    courier_pipeline::Error as PipelineError,
    courier_transport::InboundEvent,
};

use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingWebhook {
    bot_id: Option<String>,
    from: Option<String>,
    content: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    push_name: Option<String>,
}

/// `POST /webhook/incoming`
pub async fn incoming_webhook_handler(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let request: IncomingWebhook = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("invalid request body: {e}") })),
            )
                .into_response();
        },
    };

    let (Some(bot_id), Some(from), Some(content)) =
        (request.bot_id, request.from, request.content)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "botId, from and content are required" })),
        )
            .into_response();
    };

    let kind = match request.kind {
        None => MessageKind::Text,
        Some(ref value) => match MessageKind::parse(value) {
            Some(kind) => kind,
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": format!("unsupported message type: {value}") })),
                )
                    .into_response();
            },
        },
    };

    let event = InboundEvent {
        participant_id: from,
        external_id: format!(
            "wh_{}_{}",
            chrono::Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        ),
        kind,
        content,
        push_name: request.push_name.unwrap_or_default(),
        media_base64: None,
        media_mimetype: None,
    };

    match state.pipeline.handle_event(&bot_id, &event).await {
        Ok(outcome) => Json(serde_json::json!({
            "status": "received",
            "messageId": outcome.message.id,
            "bot": bot_id,
        }))
        .into_response(),
        Err(PipelineError::BotNotFound { bot_id }) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("bot not found: {bot_id}") })),
        )
            .into_response(),
        Err(e) => {
            error!(bot_id, error = %e, "webhook intake failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "internal error" })),
            )
                .into_response()
        },
    }
}
