use std::io;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::Response;
use futures::StreamExt;
use nani_core::{NaniError, OutboundStream};
use nani_types::TranslationRequest;
use serde::Deserialize;

pub mod error;
pub mod events;
pub mod translate;
pub mod translations;

use self::error::ApiError;

/// JSON body shared by `/translate` and `/translations`.
/// Fields are optional so missing ones surface as 400 rather than 422.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateBody {
    pub text: Option<String>,
    pub target_lang: Option<String>,
    /// Client-chosen record id, only used by `/translations`
    pub id: Option<String>,
}

impl TranslateBody {
    pub fn request(&self) -> Result<TranslationRequest, ApiError> {
        Ok(TranslationRequest::parse(
            self.text.as_deref(),
            self.target_lang.as_deref(),
        )?)
    }
}

pub fn json_body(
    body: Result<Json<TranslateBody>, JsonRejection>,
) -> Result<TranslateBody, ApiError> {
    body.map(|Json(body)| body)
        .map_err(|e| ApiError(NaniError::InvalidArgument(e.body_text())))
}

/// Wait for the first outbound chunk, then stream the rest as chunked text.
///
/// A failure before anything was written becomes an error status; once the
/// body started, a failure aborts the connection.
pub async fn stream_response(mut outbound: OutboundStream) -> Result<Response, ApiError> {
    let head = match outbound.next().await {
        Some(Ok(bytes)) => Some(bytes),
        Some(Err(e)) => return Err(e.into()),
        None => None,
    };

    let rest = outbound.into_stream().map(|chunk| {
        chunk.map_err(|e| {
            tracing::error!("[STREAM] aborting response: {e}");
            io::Error::other(e.to_string())
        })
    });
    let body_stream = futures::stream::iter(head.map(Ok::<Bytes, io::Error>)).chain(rest);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::TRANSFER_ENCODING, "chunked")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body_stream))
        .map_err(|e| ApiError(NaniError::Internal(format!("Failed to build stream response: {e}"))))
}
