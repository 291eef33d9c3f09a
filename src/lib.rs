//! Sheet Translator - translate Chinese text in spreadsheets to English
//!
//! This library finds cells containing Chinese characters in `.xlsx`
//! workbooks and `.csv` tables, translates them through a
//! LibreTranslate-compatible service and writes the document back with its
//! structure and styles intact, resizing workbook columns to fit.

#![forbid(unsafe_code)]

pub mod cli;
pub mod core;
pub mod document;
pub mod processors;
pub mod server;

// Re-export key types for convenience
pub use self::core::{
    capability::TranslationCapability,
    client::{AsyncTranslator, TranslationBackend},
    config::{ProcessorConfig, TranslatorConfig},
    errors::{BackendError, Result, TranslationError},
    models::{FailurePolicy, LanguagePair},
};

pub use document::{CellValue, Document, DocumentKind};

pub use processors::{DocumentProcessor, TranslatedDocument, WalkReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
