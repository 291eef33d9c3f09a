//! Core data models for translation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source/target language pair, fixed for the lifetime of a translation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Chinese to English, the only pair the pipeline translates
    pub fn zh_en() -> Self {
        Self::new("zh", "en")
    }
}

impl Default for LanguagePair {
    fn default() -> Self {
        Self::zh_en()
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.target)
    }
}

/// What to do when the backend fails on a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the whole document; nothing is rewritten
    #[default]
    Abort,
    /// Leave failed cells in the source language and carry on
    KeepSource,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Abort => write!(f, "abort"),
            FailurePolicy::KeepSource => write!(f, "keep-source"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "keep-source" | "keep_source" | "keep" => Ok(FailurePolicy::KeepSource),
            other => Err(format!("unknown failure policy: {}", other)),
        }
    }
}

/// Request body for a LibreTranslate-compatible `/translate` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub q: String,
    pub source: String,
    pub target: String,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl TranslationRequest {
    pub fn new(text: impl Into<String>, pair: &LanguagePair) -> Self {
        Self {
            q: text.into(),
            source: pair.source.clone(),
            target: pair.target.clone(),
            format: "text".to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }
}

/// Successful `/translate` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResponse {
    #[serde(rename = "translatedText")]
    pub translated_text: String,
}

/// One entry of the `/languages` listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub code: String,
    #[serde(default)]
    pub name: String,
    /// Older servers omit this; every listed code is then a valid target
    #[serde(default)]
    pub targets: Option<Vec<String>>,
}

impl LanguageInfo {
    /// Check if this language can be translated into `target`
    pub fn can_translate_to(&self, target: &str, listed: &[LanguageInfo]) -> bool {
        match &self.targets {
            Some(targets) => targets.iter().any(|t| t == target),
            None => listed.iter().any(|l| l.code == target),
        }
    }
}
