//! relay-server - Session-based chat relay.
//!
//! Accepts a user message for a session, keeps the conversation in a
//! key-value store, forwards the whole conversation to an LLM completion API
//! and returns the reply. A background task wipes every session on a fixed
//! interval.
//!
//! ```text
//! POST /chat/ → SessionHistory (load → append → complete → append → persist)
//!                     │                        │
//!                SessionStore           CompletionClient
//!                     ↑
//!                PurgeTask (every purge.interval_secs: KEYS → DEL each)
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod error;
pub mod history;
pub mod message;
pub mod purge;
pub mod routes;
pub mod store;
pub mod upstream;

pub use error::{ErrorResponse, RelayError};
pub use history::{ChatTurn, SessionHistory};
pub use message::{Message, Role};
pub use purge::{purge_once, PurgeHandle, PurgeReport, PurgeState, PurgeTask};
pub use routes::{build_router, AppState, ChatRequest, HealthResponse};
pub use store::{
    connection_info, create_store, InMemoryStore, RedisStore, SessionStore, StoreError,
};
pub use upstream::{CompletionClient, HttpCompletionClient, UpstreamError};

use axum::Router;
use relay_common::config::Config;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Router with CORS and body-size limits applied.
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    build_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
}

/// Start the relay: connect the store, spawn the purge task and serve HTTP
/// until SIGINT/SIGTERM.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let store = create_store(&config.store).await?;
    let upstream = Arc::new(HttpCompletionClient::new(&config.upstream)?);

    tracing::info!(
        url = %config.upstream.url,
        model = %upstream.model(),
        timeout_secs = config.upstream.timeout_secs,
        "Upstream client configured"
    );

    let purge = PurgeTask::new(Arc::clone(&store), config.purge.interval()).spawn();

    let app = build_app(AppState::new(store, upstream));

    let addr = config.bind_address();
    tracing::info!("Starting Chat Relay on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    purge.shutdown().await;
    tracing::info!("Chat Relay stopped");

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
