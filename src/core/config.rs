//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use crate::core::models::FailurePolicy;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000";

/// Upper bound accepted for `max_retries`
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Configuration for the translation backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    pub api_endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            max_concurrent: 8,
            max_retries: 3,
            retry_delay_ms: 500,
            timeout_ms: 30000,
        }
    }
}

/// Read an env var and parse it, falling back to `default` when unset
fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {}={:?}: {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

impl TranslatorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let api_endpoint = std::env::var("TRANSLATE_API_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());

        let api_key = std::env::var("TRANSLATE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            api_endpoint,
            api_key,
            max_concurrent: env_or("MAX_CONCURRENT", defaults.max_concurrent)?,
            max_retries: env_or("MAX_RETRIES", defaults.max_retries)?,
            retry_delay_ms: env_or("RETRY_DELAY_MS", defaults.retry_delay_ms)?,
            timeout_ms: env_or("REQUEST_TIMEOUT_MS", defaults.timeout_ms)?,
        })
    }

    /// Load from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_endpoint.trim().is_empty() {
            return Err(anyhow::anyhow!("API endpoint is required"));
        }

        if !self.api_endpoint.starts_with("http://") && !self.api_endpoint.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "API endpoint must be an http(s) URL: {}",
                self.api_endpoint
            ));
        }

        if self.max_concurrent == 0 {
            return Err(anyhow::anyhow!("max_concurrent must be greater than 0"));
        }

        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(anyhow::anyhow!(
                "max_retries must be at most {}, got {}",
                MAX_RETRIES_LIMIT,
                self.max_retries
            ));
        }

        if self.timeout_ms == 0 {
            warn!("timeout_ms is 0, requests will fail immediately");
        }

        Ok(())
    }

    /// Endpoint URL for a path below the service root
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Configuration for the document pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub failure_policy: FailurePolicy,
    pub csv_delimiter: u8,
    /// Distinct strings translated concurrently within one document
    pub max_concurrent: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Abort,
            csv_delimiter: b',',
            max_concurrent: 8,
        }
    }
}

impl ProcessorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let failure_policy = match std::env::var("ON_TRANSLATION_ERROR") {
            Ok(raw) => raw.parse::<FailurePolicy>().map_err(|e| anyhow::anyhow!(e))?,
            Err(_) => defaults.failure_policy,
        };

        let csv_delimiter = match std::env::var("CSV_DELIMITER") {
            Ok(raw) => parse_delimiter(&raw)?,
            Err(_) => defaults.csv_delimiter,
        };

        Ok(Self {
            failure_policy,
            csv_delimiter,
            max_concurrent: env_or("MAX_CONCURRENT", defaults.max_concurrent)?,
        })
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent == 0 {
            return Err(anyhow::anyhow!("max_concurrent must be greater than 0"));
        }
        if matches!(self.csv_delimiter, b'"' | b'\n' | b'\r') {
            return Err(anyhow::anyhow!(
                "invalid CSV delimiter: {:?}",
                self.csv_delimiter as char
            ));
        }
        Ok(())
    }
}

/// Parse a single-byte delimiter; `\t` and `tab` mean a tab
pub fn parse_delimiter(raw: &str) -> anyhow::Result<u8> {
    match raw {
        "\\t" | "tab" | "\t" => Ok(b'\t'),
        s if s.len() == 1 => Ok(s.as_bytes()[0]),
        s => Err(anyhow::anyhow!("CSV delimiter must be a single byte, got {:?}", s)),
    }
}
