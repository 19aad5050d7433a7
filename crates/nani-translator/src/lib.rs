use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use nani_config::Provider;
use nani_config::translator::TranslatorConfig;

pub mod gemini;
pub mod openai;
pub mod prompt;
pub mod sse;

pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;
pub use prompt::{build_prompt, build_prompt_for_code};

/// Ordered, non-empty text fragments. A yielded `Err` is always the last item.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, TranslateError>> + Send>>;

/// Streaming completion provider interface
#[async_trait::async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Open a streaming completion for `prompt`
    async fn stream_completion(&self, prompt: &str) -> Result<FragmentStream, TranslateError>;

    /// Provider metadata
    fn metadata(&self) -> ProviderMetadata;
}

#[derive(Debug, Clone)]
pub struct ProviderMetadata {
    pub name: String,
    pub model: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("No data from upstream for {0:?}")]
    IdleTimeout(Duration),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Authentication error")]
    AuthenticationError,

    #[error("Missing API key for {0}")]
    MissingApiKey(Provider),
}

/// Shared HTTP settings for both backends
#[derive(Debug, Clone)]
pub(crate) struct HttpSettings {
    pub client: reqwest::Client,
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub idle_timeout: Option<Duration>,
}

impl HttpSettings {
    fn from_config(config: &TranslatorConfig) -> Result<Self, TranslateError> {
        if config.api_key.is_empty() {
            return Err(TranslateError::MissingApiKey(config.provider));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_url: config.api_url().to_string(),
            model: config.model().to_string(),
            idle_timeout: (config.idle_timeout_seconds > 0)
                .then(|| Duration::from_secs(config.idle_timeout_seconds)),
        })
    }
}

/// Pick the backend named by the config
pub fn build_backend(
    config: &TranslatorConfig,
) -> Result<Arc<dyn CompletionBackend>, TranslateError> {
    let backend: Arc<dyn CompletionBackend> = match config.provider {
        Provider::Gemini => Arc::new(GeminiBackend::from_config(config)?),
        Provider::OpenAi => Arc::new(OpenAiBackend::from_config(config)?),
    };

    let metadata = backend.metadata();
    tracing::info!(
        "Completion backend ready: {} ({})",
        metadata.name,
        metadata.model
    );

    Ok(backend)
}

/// Map a non-success upstream status to an error
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, TranslateError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    if status == 429 {
        return Err(TranslateError::RateLimitExceeded);
    }

    if status == 401 || status == 403 {
        return Err(TranslateError::AuthenticationError);
    }

    let body = response.text().await.unwrap_or_default();
    Err(TranslateError::ApiError(format!(
        "HTTP {}: {}",
        status,
        body.chars().take(500).collect::<String>()
    )))
}
