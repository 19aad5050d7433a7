use async_trait::async_trait;
use nani_config::translator::TranslatorConfig;
use serde::Deserialize;
use serde_json::json;

use crate::sse::{self, Delta};
use crate::{
    CompletionBackend, FragmentStream, HttpSettings, ProviderMetadata, TranslateError,
    check_status,
};

/// OpenAI-compatible `/v1/chat/completions` backend
#[derive(Clone)]
pub struct OpenAiBackend {
    http: HttpSettings,
}

impl OpenAiBackend {
    pub fn from_config(config: &TranslatorConfig) -> Result<Self, TranslateError> {
        Ok(Self {
            http: HttpSettings::from_config(config)?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.http.api_url)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn stream_completion(&self, prompt: &str) -> Result<FragmentStream, TranslateError> {
        let body = json!({
            "model": self.http.model,
            "stream": true,
            "messages": [{ "role": "user", "content": prompt }]
        });

        tracing::debug!("[OPENAI] POST {}", self.endpoint());

        let response = self
            .http
            .client
            .post(self.endpoint())
            .bearer_auth(&self.http.api_key)
            .json(&body)
            .send()
            .await?;

        let response = check_status(response).await?;

        Ok(sse::fragments(response, self.http.idle_timeout, parse_event))
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            name: "OpenAI".to_string(),
            model: self.http.model.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct Choice {
    delta: Option<ChoiceDelta>,
}

#[derive(Deserialize)]
struct ChoiceDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub fn parse_event(data: &str) -> Result<Delta, TranslateError> {
    if data.trim() == "[DONE]" {
        return Ok(Delta::Done);
    }

    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| TranslateError::MalformedResponse(format!("{e}: {data}")))?;

    if let Some(error) = chunk.error {
        return Err(match error.kind.as_deref() {
            Some("insufficient_quota") | Some("rate_limit_exceeded") => {
                TranslateError::RateLimitExceeded
            }
            _ => TranslateError::ApiError(error.message),
        });
    }

    match chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
    {
        Some(text) if !text.is_empty() => Ok(Delta::Text(text)),
        _ => Ok(Delta::Skip),
    }
}
