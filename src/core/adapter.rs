//! Value-level translation with a pass-through for non-candidates

use std::sync::Arc;

use crate::core::classifier::requires_translation;
use crate::core::client::TranslationBackend;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::LanguagePair;
use crate::document::CellValue;

/// Binds a backend to a language pair
#[derive(Clone)]
pub struct TranslationAdapter {
    backend: Arc<dyn TranslationBackend>,
    pair: LanguagePair,
}

impl TranslationAdapter {
    pub fn new(backend: Arc<dyn TranslationBackend>, pair: LanguagePair) -> Self {
        Self { backend, pair }
    }

    pub fn pair(&self) -> &LanguagePair {
        &self.pair
    }

    /// Translate a cell value; values the classifier rejects come back unchanged
    /// and never reach the backend.
    pub async fn translate_value(&self, value: &CellValue) -> Result<CellValue> {
        if !requires_translation(value) {
            return Ok(value.clone());
        }
        match value {
            CellValue::String(text) => Ok(CellValue::String(self.translate_text(text).await?)),
            other => Ok(other.clone()),
        }
    }

    /// Translate text that is already known to be a candidate
    pub async fn translate_text(&self, text: &str) -> Result<String> {
        self.backend
            .translate(text, &self.pair)
            .await
            .map_err(|source| TranslationError::TranslationFailure {
                text: text.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::BackendError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TranslationBackend for Counting {
        async fn translate(
            &self,
            text: &str,
            pair: &LanguagePair,
        ) -> std::result::Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BackendError::ApiError {
                    status: 500,
                    message: "model crashed".to_string(),
                });
            }
            Ok(format!("[{}] {} chars", pair.target, text.chars().count()))
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_non_candidates_skip_backend() {
        let backend = Arc::new(Counting::default());
        let adapter = TranslationAdapter::new(backend.clone(), LanguagePair::zh_en());

        for value in [
            CellValue::Empty,
            CellValue::Number(100.0),
            CellValue::from(""),
            CellValue::from("already English"),
        ] {
            assert_eq!(adapter.translate_value(&value).await.unwrap(), value);
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_candidate_uses_backend() {
        let backend = Arc::new(Counting::default());
        let adapter = TranslationAdapter::new(backend.clone(), LanguagePair::zh_en());

        let translated = adapter.translate_value(&CellValue::from("你好")).await.unwrap();
        assert_eq!(translated, CellValue::from("[en] 2 chars"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_text_without_han_is_identity() {
        let backend = Arc::new(Counting::default());
        let adapter = TranslationAdapter::new(backend.clone(), LanguagePair::zh_en());

        for text in ["", "Q1 revenue", "こんにちは", "안녕하세요", "3.14", "〇"] {
            let value = CellValue::from(text);
            let out = tokio_test::block_on(adapter.translate_value(&value)).unwrap();
            assert_eq!(out, value);
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_is_not_masked() {
        let backend = Arc::new(Counting {
            fail: true,
            ..Default::default()
        });
        let adapter = TranslationAdapter::new(backend, LanguagePair::zh_en());

        let err = adapter.translate_value(&CellValue::from("你好")).await.unwrap_err();
        match err {
            TranslationError::TranslationFailure { text, .. } => assert_eq!(text, "你好"),
            other => panic!("unexpected error: {}", other),
        }
    }
}
