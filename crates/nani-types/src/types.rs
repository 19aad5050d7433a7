use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Languages a translation can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetLanguage {
    Ja,
    En,
}

impl TargetLanguage {
    /// ISO 639-1 code
    pub fn code(&self) -> &'static str {
        match self {
            TargetLanguage::Ja => "ja",
            TargetLanguage::En => "en",
        }
    }

    /// Name used when instructing the model
    pub fn display_name(&self) -> &'static str {
        match self {
            TargetLanguage::Ja => "日本語",
            TargetLanguage::En => "英語",
        }
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TargetLanguage {
    type Err = ParseLanguageError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        match code {
            "ja" => Ok(TargetLanguage::Ja),
            "en" => Ok(TargetLanguage::En),
            other => Err(ParseLanguageError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported target language: {0:?} (expected \"ja\" or \"en\")")]
pub struct ParseLanguageError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRequest {
    #[error("Missing text")]
    MissingText,

    #[error("Missing targetLang")]
    MissingTargetLanguage,

    #[error(transparent)]
    Language(#[from] ParseLanguageError),
}

/// A single user submission. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    text: String,
    target_language: TargetLanguage,
}

impl TranslationRequest {
    pub fn new(
        text: impl Into<String>,
        target_language: TargetLanguage,
    ) -> Result<Self, InvalidRequest> {
        let text = text.into();
        if text.is_empty() {
            return Err(InvalidRequest::MissingText);
        }

        Ok(Self {
            text,
            target_language,
        })
    }

    /// Build a request from loosely typed input, as received over the wire
    pub fn parse(text: Option<&str>, target_lang: Option<&str>) -> Result<Self, InvalidRequest> {
        let text = text.filter(|t| !t.is_empty()).ok_or(InvalidRequest::MissingText)?;
        let target_lang = target_lang
            .filter(|l| !l.is_empty())
            .ok_or(InvalidRequest::MissingTargetLanguage)?;

        Self::new(text, target_lang.parse()?)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn target_language(&self) -> TargetLanguage {
        self.target_language
    }
}

/// Stored translation. `result` is only present once the stream completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRecord {
    pub id: String,
    pub text: String,
    pub target_lang: TargetLanguage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TranslationRecord {
    pub fn new(id: String, text: String, target_lang: TargetLanguage) -> Self {
        Self {
            id,
            text,
            target_lang,
            result: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.result.is_some()
    }

    pub fn request(&self) -> Result<TranslationRequest, InvalidRequest> {
        TranslationRequest::new(self.text.clone(), self.target_lang)
    }
}
