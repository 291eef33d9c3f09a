//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rust_xlsxwriter::{Format, Workbook as XlsxWriter};
use sheet_translator::{
    BackendError, DocumentProcessor, LanguagePair, ProcessorConfig, TranslationBackend,
    TranslationCapability,
};

/// Deterministic backend: known phrases map to fixed English text, anything
/// else becomes `translated-<n>`.
#[derive(Default)]
pub struct GlossaryBackend {
    pub calls: AtomicUsize,
}

impl GlossaryBackend {
    pub fn lookup(text: &str) -> Option<&'static str> {
        match text {
            "销售额" => Some("Sales revenue"),
            "利润" => Some("Profit"),
            "张三" => Some("Zhang San"),
            "你好" => Some("Hello"),
            "备注" => Some("Remarks"),
            "合计" => Some("Total"),
            _ => None,
        }
    }
}

#[async_trait]
impl TranslationBackend for GlossaryBackend {
    async fn translate(&self, text: &str, _pair: &LanguagePair) -> Result<String, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::lookup(text)
            .map(str::to_string)
            .unwrap_or_else(|| format!("translated-{}", n)))
    }

    fn name(&self) -> &str {
        "glossary"
    }
}

/// Backend that rejects every request
pub struct FailingBackend;

#[async_trait]
impl TranslationBackend for FailingBackend {
    async fn translate(&self, _text: &str, _pair: &LanguagePair) -> Result<String, BackendError> {
        Err(BackendError::ApiError {
            status: 500,
            message: "model unavailable".to_string(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

pub fn processor_with(backend: Arc<dyn TranslationBackend>, config: ProcessorConfig) -> DocumentProcessor {
    DocumentProcessor::new(TranslationCapability::ready(backend), config)
}

pub fn glossary_processor() -> DocumentProcessor {
    processor_with(Arc::new(GlossaryBackend::default()), ProcessorConfig::default())
}

/// Two sheets: "Sheet1" with a bold `销售额` in A1, and "备注" with a note,
/// a formula and a merged range.
pub fn styled_workbook() -> Vec<u8> {
    let mut workbook = XlsxWriter::new();
    let bold = Format::new().set_bold();

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Sheet1").unwrap();
        sheet.write_string_with_format(0, 0, "销售额", &bold).unwrap();
        sheet.write_number(0, 1, 1200.0).unwrap();
        sheet.write_string(1, 0, "利润").unwrap();
        sheet.write_number(1, 1, 300.5).unwrap();
        sheet.write_string(2, 0, "Q1").unwrap();
    }

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("备注").unwrap();
        sheet.write_string(0, 0, "你好").unwrap();
        sheet.write_formula(1, 1, "=SUM(Sheet1!B1:B2)").unwrap();
        sheet.merge_range(2, 0, 2, 2, "合计", &bold).unwrap();
    }

    workbook.save_to_buffer().unwrap()
}

/// Raw bytes of one part of an `.xlsx` package
pub fn read_part(xlsx: &[u8], name: &str) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(Cursor::new(xlsx)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut data = Vec::new();
    file.read_to_end(&mut data).unwrap();
    data
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}
