use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nani_core::NaniError;
use nani_types::InvalidRequest;
use serde_json::json;

/// HTTP face of [`NaniError`]
#[derive(Debug)]
pub struct ApiError(pub NaniError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            NaniError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            NaniError::NotFound(_) => StatusCode::NOT_FOUND,
            NaniError::Upstream(_) => StatusCode::BAD_GATEWAY,
            NaniError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<NaniError> for ApiError {
    fn from(e: NaniError) -> Self {
        ApiError(e)
    }
}

impl From<InvalidRequest> for ApiError {
    fn from(e: InvalidRequest) -> Self {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!("{} {}", status, self.0);
        } else {
            tracing::debug!("{} {}", status, self.0);
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
