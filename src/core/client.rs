//! Async translation client with retry logic

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::core::config::TranslatorConfig;
use crate::core::errors::{BackendError, Result, TranslationError};
use crate::core::models::{LanguageInfo, LanguagePair, TranslationRequest, TranslationResponse};

/// Longest pause between two attempts
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Pause before retry `attempt` (1-based): `base_ms * 2^(attempt - 1)`,
/// capped at [`MAX_BACKOFF`]
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2_u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_BACKOFF)
}

/// A text-to-text translation capability
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Translate `text` from `pair.source` to `pair.target`
    async fn translate(&self, text: &str, pair: &LanguagePair) -> std::result::Result<String, BackendError>;

    /// Check whether the backend can serve `pair`
    async fn supports(&self, _pair: &LanguagePair) -> std::result::Result<bool, BackendError> {
        Ok(true)
    }

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Client for a LibreTranslate-compatible HTTP service
#[derive(Debug, Clone)]
pub struct AsyncTranslator {
    client: reqwest::Client,
    config: Arc<TranslatorConfig>,
    semaphore: Arc<Semaphore>,
}

impl AsyncTranslator {
    /// Create a new async translator
    pub fn new(config: TranslatorConfig) -> Result<Self> {
        config.validate()?;

        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| TranslationError::ConfigError {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));

        Ok(Self {
            client,
            config: Arc::new(config),
            semaphore,
        })
    }

    /// Create from environment
    pub fn from_env() -> Result<Self> {
        let config = TranslatorConfig::from_env()?;
        Self::new(config)
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Translate with retries and exponential backoff
    async fn translate_with_retry(
        &self,
        request: &TranslationRequest,
    ) -> std::result::Result<String, BackendError> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {} for '{}'", attempt, request.q);
                sleep(backoff_delay(self.config.retry_delay_ms, attempt)).await;
            }

            match self.send_request(request).await {
                Ok(translation) => {
                    if attempt > 0 {
                        info!("Successfully translated after {} retries", attempt);
                    }
                    return Ok(translation);
                }
                Err(e) => {
                    warn!("Translation attempt {} failed: {}", attempt + 1, e);
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(BackendError::InvalidResponseError {
            message: "no translation attempt was made".to_string(),
        }))
    }

    /// Send actual HTTP request
    async fn send_request(
        &self,
        request: &TranslationRequest,
    ) -> std::result::Result<String, BackendError> {
        let response = self
            .client
            .post(self.config.url("translate"))
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();

        if status.is_success() {
            let body: TranslationResponse =
                response
                    .json()
                    .await
                    .map_err(|e| BackendError::InvalidResponseError {
                        message: e.to_string(),
                    })?;
            return Ok(body.translated_text);
        }

        let status_code = status.as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let error_text = response.text().await.unwrap_or_default();

        if status_code == 429 {
            return Err(BackendError::RateLimitError { retry_after });
        }

        // LibreTranslate answers 400 for language pairs it has no model for
        if status_code == 400 && error_text.to_lowercase().contains("not supported") {
            return Err(BackendError::UnsupportedPair {
                source_lang: request.source.clone(),
                target_lang: request.target.clone(),
            });
        }

        Err(BackendError::ApiError {
            status: status_code,
            message: error_text,
        })
    }

    /// Fetch the installed language list
    pub async fn languages(&self) -> std::result::Result<Vec<LanguageInfo>, BackendError> {
        let response = self
            .client
            .get(self.config.url("languages"))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::ApiError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponseError {
                message: e.to_string(),
            })
    }
}

fn map_transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::TimeoutError
    } else {
        BackendError::NetworkError {
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl TranslationBackend for AsyncTranslator {
    async fn translate(
        &self,
        text: &str,
        pair: &LanguagePair,
    ) -> std::result::Result<String, BackendError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| BackendError::NetworkError {
                message: format!("translator is shutting down: {}", e),
            })?;

        let request = TranslationRequest::new(text, pair).with_api_key(self.config.api_key.clone());
        self.translate_with_retry(&request).await
    }

    async fn supports(&self, pair: &LanguagePair) -> std::result::Result<bool, BackendError> {
        let languages = self.languages().await?;
        let supported = languages
            .iter()
            .find(|l| l.code == pair.source)
            .map(|l| l.can_translate_to(&pair.target, &languages))
            .unwrap_or(false);

        debug!(
            "Backend lists {} languages, {} supported: {}",
            languages.len(),
            pair,
            supported
        );
        Ok(supported)
    }

    fn name(&self) -> &str {
        &self.config.api_endpoint
    }
}
