use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use nani_core::NaniError;
use serde_json::{Value, json};

use super::error::ApiError;
use super::{TranslateBody, json_body, stream_response};
use crate::state::AppState;

/// POST /translations
pub async fn create(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TranslateBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = json_body(body)?;
    let request = body.request()?;

    let id = match body.id {
        Some(id) if !id.is_empty() => id,
        Some(_) => return Err(NaniError::InvalidArgument("Empty id".to_string()).into()),
        None => uuid::Uuid::new_v4().to_string(),
    };

    state
        .store
        .create(id.clone(), request.text(), request.target_language());

    tracing::info!("[TRANSLATIONS] created {id}");

    Ok(Json(json!({ "id": id })))
}

/// GET /translations
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "translations": state.store.list() }))
}

/// GET /translations/:id
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let translation = state.store.get(&id)?;
    Ok(Json(json!({ "translation": translation })))
}

/// GET /translations/:id/stream
///
/// Runs the translation of a stored record and attaches the result to it
/// once the stream completes.
pub async fn stream(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (record, persist) = state.store.bind(&id)?;
    let request = record.request()?;

    let (outbound, handle) = state.relay.begin(request, Some(persist));

    if state.relays.insert(id.clone(), handle).is_some() {
        tracing::warn!("[TRANSLATIONS] {id} restarted while a previous relay was registered");
    }
    tracing::info!(
        "[TRANSLATIONS] streaming {id}, {} relays active",
        state.relays.active_count()
    );

    stream_response(outbound).await
}
