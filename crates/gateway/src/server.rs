//! Router assembly and server startup.

use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Json, Router,
        extract::State,
        response::IntoResponse,
        routing::{get, post},
    },
    tracing::info,
};

use {
    courier_pipeline::Pipeline, courier_store::RecordStore, courier_transport::TransportRegistry,
};

use crate::{send_routes::send_handler, webhook_routes::incoming_webhook_handler};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub store: RecordStore,
    pub transports: Arc<TransportRegistry>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhook/incoming", post(incoming_webhook_handler))
        .route("/send", post(send_handler))
        .with_state(state)
}

/// Bind and serve until the task is cancelled.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "gateway listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(_state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
