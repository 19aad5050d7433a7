use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::Response;

use super::error::ApiError;
use super::{TranslateBody, json_body, stream_response};
use crate::state::AppState;

/// POST /translate
///
/// Streams the translation straight back without storing anything.
pub async fn translate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TranslateBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(body)?.request()?;

    tracing::info!(
        "[TRANSLATE] {} chars -> {}",
        request.text().chars().count(),
        request.target_language()
    );

    let (outbound, _handle) = state.relay.begin(request, None);
    stream_response(outbound).await
}
