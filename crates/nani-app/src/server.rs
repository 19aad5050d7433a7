use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::routes::{events, translate, translations};
use crate::state::AppState;

pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/translate", post(translate::translate))
        .route(
            "/translations",
            post(translations::create).get(translations::list),
        )
        .route("/translations/:id", get(translations::get))
        .route("/translations/:id/stream", get(translations::stream))
        .route("/translations/:id/events", get(events::events))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Serve HTTP until `cancel` fires
pub async fn serve(state: Arc<AppState>, cancel: CancellationToken) -> anyhow::Result<()> {
    let (addr, max_body_bytes) = {
        let config = state.config.read().await;
        (config.server.bind_address(), config.server.max_body_bytes)
    };

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!("Nani listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state, max_body_bytes))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("Server error")?;

    Ok(())
}
