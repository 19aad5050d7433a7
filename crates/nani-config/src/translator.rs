use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Upstream completion provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    #[serde(alias = "open-ai")]
    OpenAi,
}

impl Provider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-2.5-flash-lite",
            Provider::OpenAi => "gpt-4o-mini",
        }
    }

    pub fn default_api_url(&self) -> &'static str {
        match self {
            Provider::Gemini => "https://generativelanguage.googleapis.com",
            Provider::OpenAi => "https://api.openai.com",
        }
    }

    /// Environment variable holding the credential for this provider
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gemini => f.write_str("gemini"),
            Provider::OpenAi => f.write_str("openai"),
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "openai" | "open-ai" => Ok(Provider::OpenAi),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

fn default_idle_timeout_seconds() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub provider: Provider,
    /// Falls back to the provider's default model
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: String,
    /// Base URL, falls back to the provider's public endpoint
    pub api_url: Option<String>,
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    /// Longest wait between two upstream chunks, 0 disables it
    #[serde(default = "default_idle_timeout_seconds")]
    pub idle_timeout_seconds: u64,
}

impl TranslatorConfig {
    pub fn new() -> Self {
        let provider: Provider = env::var("NANI_PROVIDER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        let api_key = env::var(provider.api_key_var()).unwrap_or_default();

        let connect_timeout_seconds = env::var("CONNECT_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_connect_timeout_seconds);

        let idle_timeout_seconds = env::var("IDLE_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_idle_timeout_seconds);

        Self {
            provider,
            model: env::var("NANI_MODEL").ok().filter(|m| !m.is_empty()),
            api_key,
            api_url: env::var("NANI_API_URL").ok().filter(|u| !u.is_empty()),
            connect_timeout_seconds,
            idle_timeout_seconds,
        }
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_url())
            .trim_end_matches('/')
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            api_key: String::new(),
            api_url: None,
            connect_timeout_seconds: default_connect_timeout_seconds(),
            idle_timeout_seconds: default_idle_timeout_seconds(),
        }
    }
}
