//! Translation walker: visits every scalar value of a document and rewrites
//! the ones that need translation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::core::adapter::TranslationAdapter;
use crate::core::classifier::requires_translation;
use crate::core::errors::Result;
use crate::core::models::FailurePolicy;
use crate::document::{CellValue, Document};

/// Counters describing one walk over a document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkReport {
    /// Scalar values visited
    pub visited: usize,
    /// Values the classifier selected
    pub candidates: usize,
    /// Distinct candidate strings sent to the backend
    pub unique: usize,
    /// Values rewritten with a translation
    pub translated: usize,
    /// Values left in the source language after a failure
    pub failed: usize,
}

/// Applies a [`TranslationAdapter`] over a [`Document`]
#[derive(Clone)]
pub struct TranslationWalker {
    adapter: TranslationAdapter,
    max_concurrent: usize,
    policy: FailurePolicy,
}

impl TranslationWalker {
    pub fn new(adapter: TranslationAdapter, max_concurrent: usize, policy: FailurePolicy) -> Self {
        Self {
            adapter,
            max_concurrent: max_concurrent.max(1),
            policy,
        }
    }

    /// Translate every candidate value in place.
    ///
    /// Distinct strings are translated concurrently, then all results are
    /// applied in traversal order once every translation has finished. Under
    /// [`FailurePolicy::Abort`] a failure returns before any value changes.
    pub async fn walk(&self, document: &mut Document) -> Result<WalkReport> {
        let mut report = WalkReport::default();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for value in document.values() {
            report.visited += 1;
            if !requires_translation(value) {
                continue;
            }
            report.candidates += 1;
            if let CellValue::String(text) = value {
                if seen.insert(text.as_str()) {
                    pending.push(text.clone());
                }
            }
        }
        report.unique = pending.len();

        if pending.is_empty() {
            debug!("Nothing to translate in {} values", report.visited);
            return Ok(report);
        }

        debug!(
            "Translating {} distinct strings ({} cells, {} in flight)",
            report.unique, report.candidates, self.max_concurrent
        );

        let translations = self.translate_all(pending).await?;

        document.for_each_value_mut(|value| {
            if !requires_translation(value) {
                return;
            }
            let replacement = match value {
                CellValue::String(text) => translations.get(text.as_str()).cloned(),
                _ => None,
            };
            match replacement {
                Some(translated) => {
                    *value = CellValue::String(translated);
                    report.translated += 1;
                }
                None => report.failed += 1,
            }
        });

        Ok(report)
    }

    /// Translate each string once. Failed strings are absent from the map
    /// under [`FailurePolicy::KeepSource`].
    async fn translate_all(&self, texts: Vec<String>) -> Result<HashMap<String, String>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for text in texts {
            let adapter = self.adapter.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = adapter.translate_text(&text).await;
                (text, result)
            });
        }

        let mut translations = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (text, result) = joined.map_err(std::io::Error::from)?;
            match result {
                Ok(translated) => {
                    translations.insert(text, translated);
                }
                Err(e) => match self.policy {
                    FailurePolicy::Abort => {
                        tasks.abort_all();
                        return Err(e);
                    }
                    FailurePolicy::KeepSource => {
                        warn!("Keeping source text: {}", e);
                    }
                },
            }
        }

        Ok(translations)
    }
}
