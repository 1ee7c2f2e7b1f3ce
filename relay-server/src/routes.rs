//! HTTP API routes.

use crate::error::RelayError;
use crate::history::{ChatTurn, SessionHistory};
use crate::store::SessionStore;
use crate::upstream::CompletionClient;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Application context, built once at startup and shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub history: SessionHistory,
    pub store: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn SessionStore>, upstream: Arc<dyn CompletionClient>) -> Self {
        Self {
            history: SessionHistory::new(Arc::clone(&store), upstream),
            store,
        }
    }
}

/// Chat request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub store: String,
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chat", post(chat))
        .route("/chat/", post(chat))
        .with_state(state)
}

// ============ Health Check ============

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = state.store.is_healthy().await;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "degraded" }.to_string(),
            service: "relay-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store: state.store.name().to_string(),
        }),
    )
}

// ============ Chat ============

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatTurn>, RelayError> {
    let Json(request) = payload.map_err(|e| RelayError::Validation(e.body_text()))?;

    if request.message.is_empty() {
        return Err(RelayError::Validation("message must not be empty".into()));
    }

    tracing::debug!(
        session_id = request.session_id.as_deref().unwrap_or("<new>"),
        message_len = request.message.len(),
        "Chat request received"
    );

    let turn = state
        .history
        .chat_turn(request.session_id.as_deref(), &request.message)
        .await?;

    Ok(Json(turn))
}
