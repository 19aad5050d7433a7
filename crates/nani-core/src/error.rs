use std::sync::Arc;

use nani_translator::TranslateError;
use nani_types::InvalidRequest;

/// Failure taxonomy shared by the relay, the store and the HTTP layer
#[derive(Debug, Clone, thiserror::Error)]
pub enum NaniError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Translation not found: {0}")]
    NotFound(String),

    #[error("Upstream failure: {0}")]
    Upstream(Arc<TranslateError>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<InvalidRequest> for NaniError {
    fn from(e: InvalidRequest) -> Self {
        NaniError::InvalidArgument(e.to_string())
    }
}

impl From<TranslateError> for NaniError {
    fn from(e: TranslateError) -> Self {
        match e {
            TranslateError::InvalidArgument(message) => NaniError::InvalidArgument(message),
            other => NaniError::Upstream(Arc::new(other)),
        }
    }
}
