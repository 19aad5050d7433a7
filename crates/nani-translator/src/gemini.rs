use async_trait::async_trait;
use nani_config::translator::TranslatorConfig;
use serde::Deserialize;
use serde_json::json;

use crate::sse::{self, Delta};
use crate::{
    CompletionBackend, FragmentStream, HttpSettings, ProviderMetadata, TranslateError,
    check_status,
};

/// Google Gemini `streamGenerateContent` backend
#[derive(Clone)]
pub struct GeminiBackend {
    http: HttpSettings,
}

impl GeminiBackend {
    pub fn from_config(config: &TranslatorConfig) -> Result<Self, TranslateError> {
        Ok(Self {
            http: HttpSettings::from_config(config)?,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.http.api_url, self.http.model
        )
    }
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    async fn stream_completion(&self, prompt: &str) -> Result<FragmentStream, TranslateError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        });

        tracing::debug!("[GEMINI] POST {}", self.endpoint());

        let response = self
            .http
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.http.api_key)
            .json(&body)
            .send()
            .await?;

        let response = check_status(response).await?;

        Ok(sse::fragments(response, self.http.idle_timeout, parse_event))
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            name: "Gemini".to_string(),
            model: self.http.model.clone(),
        }
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

/// Text of the first candidate, all parts joined
pub fn parse_event(data: &str) -> Result<Delta, TranslateError> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| TranslateError::MalformedResponse(format!("{e}: {data}")))?;

    if let Some(error) = chunk.error {
        return Err(match error.status.as_deref() {
            Some("RESOURCE_EXHAUSTED") => TranslateError::RateLimitExceeded,
            Some("UNAUTHENTICATED") | Some("PERMISSION_DENIED") => {
                TranslateError::AuthenticationError
            }
            _ => TranslateError::ApiError(error.message),
        });
    }

    let text: String = chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        Ok(Delta::Skip)
    } else {
        Ok(Delta::Text(text))
    }
}
