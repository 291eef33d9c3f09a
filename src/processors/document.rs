//! Workbook and table processor: the full translate pipeline for one document

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::core::adapter::TranslationAdapter;
use crate::core::capability::TranslationCapability;
use crate::core::config::ProcessorConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::LanguagePair;
use crate::document::{Document, DocumentKind, LeakInfo};
use crate::processors::reflow::reflow_document;
use crate::processors::walker::{TranslationWalker, WalkReport};

/// Prefix of every output file name
pub const OUTPUT_PREFIX: &str = "translated_";

/// Result of translating one document
#[derive(Debug, Clone)]
pub struct TranslatedDocument {
    /// Suggested download name: `translated_` + input name
    pub file_name: String,
    pub media_type: &'static str,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub report: WalkReport,
}

impl TranslatedDocument {
    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

/// Output name for an input file name
pub fn output_file_name(file_name: &str) -> String {
    format!("{}{}", OUTPUT_PREFIX, file_name)
}

/// Processor for `.xlsx` workbooks and `.csv` tables
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    capability: TranslationCapability,
    config: ProcessorConfig,
    pair: LanguagePair,
}

impl DocumentProcessor {
    /// Create a new processor translating Chinese to English
    pub fn new(capability: TranslationCapability, config: ProcessorConfig) -> Self {
        Self {
            capability,
            config,
            pair: LanguagePair::zh_en(),
        }
    }

    pub fn with_pair(mut self, pair: LanguagePair) -> Self {
        self.pair = pair;
        self
    }

    pub fn capability(&self) -> &TranslationCapability {
        &self.capability
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Translate a document held in memory.
    ///
    /// The file name decides the document kind. Nothing is produced unless
    /// every step succeeds.
    pub async fn translate_bytes(&self, file_name: &str, bytes: &[u8]) -> Result<TranslatedDocument> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let kind = DocumentKind::from_file_name(file_name)?;
        // Checked before parsing so an unready backend never sees a document
        let backend = self.capability.backend().await?;

        debug!("Translating {} ({}, {} bytes)", file_name, kind, bytes.len());

        let mut document = Document::deserialize(bytes, kind, self.config.csv_delimiter)?;

        let walker = TranslationWalker::new(
            TranslationAdapter::new(backend, self.pair.clone()),
            self.config.max_concurrent,
            self.config.failure_policy,
        );
        let report = walker.walk(&mut document).await?;

        reflow_document(&mut document);
        let output = document.serialize()?;

        let elapsed = clock.elapsed();
        info!(
            "Translated {}: {}/{} cells in {:.2}s ({} failed)",
            file_name,
            report.translated,
            report.candidates,
            elapsed.as_secs_f64(),
            report.failed
        );

        Ok(TranslatedDocument {
            file_name: output_file_name(file_name),
            media_type: kind.media_type(),
            kind,
            bytes: output,
            started_at,
            finished_at: Utc::now(),
            elapsed,
            report,
        })
    }

    /// Translate a file on disk. Without `output` the result is written next
    /// to the input as `translated_<name>`.
    pub async fn translate_file(
        &self,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<(PathBuf, TranslatedDocument)> {
        debug!("Translating: {}", input.display());

        let file_name = file_name_of(input)?;
        let bytes = tokio::fs::read(input)
            .await
            .map_err(|e| TranslationError::FileError {
                path: input.display().to_string(),
                message: e.to_string(),
            })?;

        let translated = self.translate_bytes(&file_name, &bytes).await?;

        let output = match output {
            Some(path) => path.to_path_buf(),
            None => input.with_file_name(&translated.file_name),
        };

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| TranslationError::FileError {
                        path: parent.display().to_string(),
                        message: e.to_string(),
                    })?;
            }
        }

        tokio::fs::write(&output, &translated.bytes)
            .await
            .map_err(|e| TranslationError::FileError {
                path: output.display().to_string(),
                message: e.to_string(),
            })?;

        info!("Translated: {} -> {}", input.display(), output.display());
        Ok((output, translated))
    }

    /// Find workbooks and tables in a directory
    pub fn find_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        ensure_dir(dir)?;

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_document_file(&path) {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Find workbooks and tables recursively
    pub fn find_files_recursive(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        ensure_dir(dir)?;

        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && is_document_file(path) {
                files.push(path.to_path_buf());
            }
        }

        Ok(files)
    }

    /// Cells of a document that still contain CJK text
    pub fn check_untranslated(&self, file_name: &str, bytes: &[u8]) -> Result<Vec<LeakInfo>> {
        let kind = DocumentKind::from_file_name(file_name)?;
        let document = Document::deserialize(bytes, kind, self.config.csv_delimiter)?;
        let leaks = document.untranslated();
        debug!("{}: {} untranslated cells", file_name, leaks.len());
        Ok(leaks)
    }

    /// [`DocumentProcessor::check_untranslated`] for a file on disk
    pub async fn check_file(&self, path: &Path) -> Result<Vec<LeakInfo>> {
        let file_name = file_name_of(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TranslationError::FileError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        self.check_untranslated(&file_name, &bytes)
    }

    /// Save leak report to JSON
    pub async fn save_leak_report(&self, leaks: &[LeakInfo], path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(leaks)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(TranslationError::FileError {
            path: dir.display().to_string(),
            message: "Not a directory".to_string(),
        });
    }
    Ok(())
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| TranslationError::FileError {
            path: path.display().to_string(),
            message: "Not a file".to_string(),
        })
}

/// `.xlsx`/`.csv` inputs, skipping earlier outputs and office lock files
fn is_document_file(path: &Path) -> bool {
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy(),
        None => return false,
    };
    if name.starts_with(OUTPUT_PREFIX) || name.starts_with("~$") {
        return false;
    }
    DocumentKind::from_file_name(&name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::TranslationBackend;
    use crate::core::errors::BackendError;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Echo;

    #[async_trait]
    impl TranslationBackend for Echo {
        async fn translate(
            &self,
            text: &str,
            _pair: &LanguagePair,
        ) -> std::result::Result<String, BackendError> {
            Ok(format!("en({})", text.chars().count()))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn processor() -> DocumentProcessor {
        DocumentProcessor::new(
            TranslationCapability::ready(Arc::new(Echo)),
            ProcessorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_translate_csv_bytes() {
        let out = processor()
            .translate_bytes("people.csv", "name,note\n张三,你好\n".as_bytes())
            .await
            .unwrap();

        assert_eq!(out.file_name, "translated_people.csv");
        assert_eq!(out.media_type, "text/csv");
        assert_eq!(out.kind, DocumentKind::Table);
        assert_eq!(String::from_utf8(out.bytes).unwrap(), "name,note\nen(2),en(2)\n");
        assert_eq!(out.report.unique, 2);
        assert!(out.finished_at >= out.started_at);
    }

    #[tokio::test]
    async fn test_unsupported_suffix() {
        let err = processor()
            .translate_bytes("report.txt", b"hello")
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::UnsupportedShape { .. }));
    }

    #[tokio::test]
    async fn test_pending_capability_fails_fast() {
        let processor = DocumentProcessor::new(TranslationCapability::new(), ProcessorConfig::default());
        let err = processor
            .translate_bytes("a.csv", "name\n张三\n".as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::CapabilityUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_workbook() {
        let err = processor()
            .translate_bytes("broken.xlsx", b"not a zip")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TranslationError::Deserialize {
                kind: DocumentKind::Workbook,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_translate_file_and_find_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.csv"), "名称\n苹果\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("b.CSV"), "x\n1\n").unwrap();

        let processor = processor();
        assert_eq!(processor.find_files(dir.path()).unwrap().len(), 1);
        assert_eq!(processor.find_files_recursive(dir.path()).unwrap().len(), 2);

        let (path, _) = processor
            .translate_file(&dir.path().join("a.csv"), None)
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("translated_a.csv"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "en(2)\nen(2)\n");

        // Outputs are not picked up again
        assert_eq!(processor.find_files(dir.path()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_check_untranslated() {
        let leaks = processor()
            .check_untranslated("t.csv", "name,note\nok,你好\n".as_bytes())
            .unwrap();
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].location, "row 1, column \"note\"");
        assert_eq!(leaks[0].original, "你好");
    }

    #[tokio::test]
    async fn test_save_leak_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leaks.json");
        let leaks = vec![LeakInfo {
            location: "Sheet1!A1".to_string(),
            original: "销售额".to_string(),
        }];

        processor().save_leak_report(&leaks, &path).await.unwrap();

        let saved: Vec<LeakInfo> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, leaks);
    }
}
