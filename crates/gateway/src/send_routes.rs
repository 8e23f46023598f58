//! Outbound send endpoint for the automation backend.

use {
    axum::{
        Json,
        extract::State,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
    },
    tracing::{error, info},
    uuid::Uuid,
};

use {
    courier_store::NewMessage,
    courier_transport::{SendPayload, SendRequest, normalize_address},
};

use crate::server::AppState;

/// `POST /send`
///
/// Authenticated per bot via `X-API-Key`. On success the outbound message is
/// persisted against the conversation so the history shows both directions.
pub async fn send_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let request: SendRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("invalid request body: {e}") })),
            )
                .into_response();
        },
    };

    let Some(api_key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "X-API-Key header is required" })),
        )
            .into_response();
    };

    let bot = match state.store.get_bot(&request.bot_id).await {
        Ok(Some(bot)) => bot,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": format!("bot not found: {}", request.bot_id) })),
            )
                .into_response();
        },
        Err(e) => {
            error!(bot_id = %request.bot_id, error = %e, "failed to load bot");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "internal error" })),
            )
                .into_response();
        },
    };

    if api_key != bot.api_key {
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "invalid API key" })),
        )
            .into_response();
    }

    let (kind, payload) = match SendPayload::from_request(&request) {
        Ok(mapped) => mapped,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        },
    };

    let Some(transport) = state.transports.get_connected(&bot.id).await else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "transport session is not connected" })),
        )
            .into_response();
    };

    let to = normalize_address(&request.to);
    if let Err(e) = transport.send(&to, &payload).await {
        error!(bot_id = %bot.id, to, error = %e, "transport send failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": format!("send failed: {e}") })),
        )
            .into_response();
    }

    // Best-effort history write; the message already left the building.
    if let Err(e) = persist_outbound(&state, &bot.id, &to, kind, &request).await {
        error!(bot_id = %bot.id, to, error = %e, "failed to persist outbound message");
    }

    info!(bot_id = %bot.id, to, kind = %kind, "outbound message sent");
    Json(serde_json::json!({
        "success": true,
        "to": to,
        "type": kind,
    }))
    .into_response()
}

async fn persist_outbound(
    state: &AppState,
    bot_id: &str,
    to: &str,
    kind: courier_common::MessageKind,
    request: &SendRequest,
) -> courier_store::error::Result<()> {
    let local = to.split('@').next().unwrap_or(to);
    let (conversation, _) = state
        .store
        .upsert_conversation(bot_id, to, &format!("User {local}"))
        .await?;

    let content = request
        .content
        .clone()
        .or_else(|| request.caption.clone())
        .or_else(|| request.media_url.clone())
        .unwrap_or_default();

    let now_ms = chrono::Utc::now().timestamp_millis();
    state
        .store
        .upsert_message(NewMessage {
            external_id: format!("out_{}", Uuid::new_v4().simple()),
            conversation_id: conversation.id,
            sender: bot_id.to_string(),
            from_me: true,
            content,
            kind,
            forwarded_at_ms: Some(now_ms),
            processed: true,
        })
        .await?;
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use {
        super::*,
        async_trait::async_trait,
        axum::body::to_bytes,
        courier_pipeline::{BatchBuffer, Batcher, Pipeline},
        courier_queue::{DeliveryQueue, MemoryJobStore},
        courier_store::RecordStore,
        courier_transport::{Transport, TransportRegistry},
    };

    struct FakeTransport {
        connected: bool,
        fail: bool,
        sends: AtomicUsize,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn send(&self, _to: &str, _payload: &SendPayload) -> anyhow::Result<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("socket closed");
            }
            Ok(())
        }
    }

    async fn make_state() -> (AppState, String) {
        let pool = courier_store::open_in_memory().await.unwrap();
        BatchBuffer::init(&pool).await.unwrap();
        let store = RecordStore::new(pool.clone());
        let queue = DeliveryQueue::new(Arc::new(MemoryJobStore::new()));
        let batcher = Batcher::new(BatchBuffer::new(pool), store.clone(), Arc::clone(&queue));
        let bot = store
            .create_bot(courier_store::NewBot {
                name: "alpha".into(),
                identifier: "bot@network".into(),
                callback_url: None,
                api_key: "secret".into(),
                response_delay_secs: 0,
            })
            .await
            .unwrap();
        let state = AppState {
            pipeline: Pipeline::new(store.clone(), queue, batcher),
            store,
            transports: Arc::new(TransportRegistry::new()),
        };
        (state, bot.id)
    }

    fn key_headers(value: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = value {
            headers.insert("x-api-key", value.parse().unwrap());
        }
        headers
    }

    async fn call(
        state: AppState,
        headers: HeaderMap,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let response = send_handler(State(state), headers, Json(body))
            .await
            .into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_send_normalizes_address_and_persists_outbound() {
        let (state, bot_id) = make_state().await;
        let transport = Arc::new(FakeTransport {
            connected: true,
            fail: false,
            sends: AtomicUsize::new(0),
        });
        state.transports.insert(&bot_id, transport.clone()).await;

        let (status, body) = call(
            state.clone(),
            key_headers(Some("secret")),
            serde_json::json!({
                "botId": bot_id,
                "to": "5511999",
                "type": "TEXT",
                "content": "hi there",
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["to"], "5511999@s.whatsapp.net");
        assert_eq!(body["type"], "TEXT");
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);

        let conversation = state
            .store
            .find_conversation(&bot_id, "5511999@s.whatsapp.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.name, "User 5511999");
    }

    #[tokio::test]
    async fn test_missing_key_is_unauthorized() {
        let (state, bot_id) = make_state().await;
        let (status, _) = call(
            state,
            key_headers(None),
            serde_json::json!({ "botId": bot_id, "to": "5511999", "type": "TEXT" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_key_is_forbidden() {
        let (state, bot_id) = make_state().await;
        let (status, _) = call(
            state,
            key_headers(Some("nope")),
            serde_json::json!({ "botId": bot_id, "to": "5511999", "type": "TEXT" }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_bot_is_not_found() {
        let (state, _) = make_state().await;
        let (status, _) = call(
            state,
            key_headers(Some("secret")),
            serde_json::json!({ "botId": "missing", "to": "5511999", "type": "TEXT" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_media_without_url_is_bad_request() {
        let (state, bot_id) = make_state().await;
        let (status, body) = call(
            state,
            key_headers(Some("secret")),
            serde_json::json!({ "botId": bot_id, "to": "5511999", "type": "IMAGE" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("mediaUrl"));
    }

    #[tokio::test]
    async fn test_disconnected_transport_is_unavailable() {
        let (state, bot_id) = make_state().await;
        state
            .transports
            .insert(
                &bot_id,
                Arc::new(FakeTransport {
                    connected: false,
                    fail: false,
                    sends: AtomicUsize::new(0),
                }),
            )
            .await;

        let (status, _) = call(
            state,
            key_headers(Some("secret")),
            serde_json::json!({ "botId": bot_id, "to": "5511999", "type": "TEXT" }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_transport_failure_is_internal_error() {
        let (state, bot_id) = make_state().await;
        state
            .transports
            .insert(
                &bot_id,
                Arc::new(FakeTransport {
                    connected: true,
                    fail: true,
                    sends: AtomicUsize::new(0),
                }),
            )
            .await;

        let (status, body) = call(
            state,
            key_headers(Some("secret")),
            serde_json::json!({ "botId": bot_id, "to": "5511999", "type": "TEXT" }),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("send failed"));
    }
}
