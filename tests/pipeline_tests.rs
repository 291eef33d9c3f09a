//! End-to-end tests for the document pipeline

mod common;

use async_trait::async_trait;
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use pretty_assertions::assert_eq;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook as XlsxWriter};
use std::io::Cursor;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{
    contains_cjk, glossary_processor, processor_with, read_part, styled_workbook, FailingBackend,
    GlossaryBackend,
};
use sheet_translator::document::Workbook;
use sheet_translator::processors::reflow::column_width;
use sheet_translator::{
    BackendError, CellValue, DocumentKind, DocumentProcessor, FailurePolicy, LanguagePair,
    ProcessorConfig, TranslationBackend, TranslationCapability, TranslationError,
};

fn read_back(bytes: &[u8]) -> Xlsx<Cursor<Vec<u8>>> {
    open_workbook_from_rs(Cursor::new(bytes.to_vec())).unwrap()
}

#[tokio::test]
async fn test_csv_scenario() {
    let out = glossary_processor()
        .translate_bytes("people.csv", "name,note\n张三,你好\n".as_bytes())
        .await
        .unwrap();

    assert_eq!(out.file_name, "translated_people.csv");
    assert_eq!(out.kind, DocumentKind::Table);
    let text = String::from_utf8(out.bytes).unwrap();
    assert_eq!(text, "name,note\nZhang San,Hello\n");
    assert!(!contains_cjk(&text));
}

#[tokio::test]
async fn test_mixed_row_keeps_numbers_and_empties() {
    let out = glossary_processor()
        .translate_bytes("mixed.csv", "a,b,c\n100,你好,\n".as_bytes())
        .await
        .unwrap();

    assert_eq!(String::from_utf8(out.bytes).unwrap(), "a,b,c\n100,Hello,\n");
    assert_eq!(out.report.candidates, 1);
}

#[tokio::test]
async fn test_workbook_scenario() {
    let input = styled_workbook();
    let out = glossary_processor()
        .translate_bytes("report.xlsx", &input)
        .await
        .unwrap();

    assert_eq!(out.file_name, "translated_report.xlsx");
    assert_eq!(
        out.media_type,
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );

    // Independent reader sees the same sheets, in order, with no CJK cells
    let mut reader = read_back(&out.bytes);
    assert_eq!(reader.sheet_names(), vec!["Sheet1".to_string(), "备注".to_string()]);

    let sheet1 = reader.worksheet_range("Sheet1").unwrap();
    assert_eq!(
        sheet1.get_value((0, 0)),
        Some(&Data::String("Sales revenue".to_string()))
    );
    assert_eq!(sheet1.get_value((0, 1)), Some(&Data::Float(1200.0)));
    assert_eq!(sheet1.get_value((1, 0)), Some(&Data::String("Profit".to_string())));
    assert_eq!(sheet1.get_value((1, 1)), Some(&Data::Float(300.5)));
    assert_eq!(sheet1.get_value((2, 0)), Some(&Data::String("Q1".to_string())));

    let notes = reader.worksheet_range("备注").unwrap();
    assert_eq!(notes.get_value((0, 0)), Some(&Data::String("Hello".to_string())));
    assert_eq!(notes.get_value((2, 0)), Some(&Data::String("Total".to_string())));

    for name in reader.sheet_names() {
        let range = reader.worksheet_range(&name).unwrap();
        for cell in range.used_cells() {
            if let (_, _, Data::String(s)) = cell {
                assert!(!contains_cjk(s), "untranslated cell: {}", s);
            }
        }
    }

    // Styles are carried over untouched
    assert_eq!(
        read_part(&out.bytes, "xl/styles.xml"),
        read_part(&input, "xl/styles.xml")
    );

    let before = Workbook::from_bytes(&input).unwrap();
    let after = Workbook::from_bytes(&out.bytes).unwrap();
    assert_eq!(after.sheet_names(), before.sheet_names());
    for (b, a) in before.sheets.iter().zip(after.sheets.iter()) {
        assert_eq!(a.row_count(), b.row_count());
        assert_eq!(a.column_count(), b.column_count());
        for ((row_b, cell_b), (row_a, cell_a)) in b.cells().zip(a.cells()) {
            assert_eq!(row_a, row_b);
            assert_eq!(cell_a.column, cell_b.column);
            assert_eq!(cell_a.style, cell_b.style);
        }
    }

    // Bold A1 keeps its format
    let a1 = after.sheets[0].cell(0, 0).unwrap();
    assert_eq!(a1.style, before.sheets[0].cell(0, 0).unwrap().style);
    assert!(a1.style.index().is_some());

    // Formula untouched, merged range kept
    assert_eq!(
        after.sheets[1].cell(1, 1).unwrap().value,
        CellValue::Formula("SUM(Sheet1!B1:B2)".to_string())
    );
    let notes_xml = String::from_utf8(read_part(&out.bytes, "xl/worksheets/sheet2.xml")).unwrap();
    assert!(notes_xml.contains(r#"<mergeCell ref="A3:C3"/>"#));

    // Column A widened to fit "Sales revenue"
    let width = after.sheets[0].column_width(0).unwrap();
    assert_eq!(width, column_width("Sales revenue".chars().count()));
    assert!(width > before.sheets[0].column_width(0).unwrap_or(8.43));
    assert_eq!(
        after.sheets[0].column_width(1),
        Some(column_width("300.5".len()))
    );
}

#[tokio::test]
async fn test_columns_left_of_data_keep_their_width() {
    let mut input = XlsxWriter::new();
    input.add_worksheet().write_string(0, 3, "销售额").unwrap();
    let input = input.save_to_buffer().unwrap();

    let out = glossary_processor()
        .translate_bytes("offset.xlsx", &input)
        .await
        .unwrap();

    let after = Workbook::from_bytes(&out.bytes).unwrap();
    let sheet = &after.sheets[0];
    for column in 0..3 {
        assert_eq!(sheet.column_width(column), None);
    }
    assert_eq!(sheet.column_width(3), Some(column_width("Sales revenue".len())));

    let xml = String::from_utf8(read_part(&out.bytes, "xl/worksheets/sheet1.xml")).unwrap();
    assert!(xml.contains(r#"<col min="4" max="4""#));
    assert!(!xml.contains(r#"<col min="1""#));
}

#[tokio::test]
async fn test_date_column_sized_for_dates() {
    let mut input = XlsxWriter::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let date = ExcelDateTime::from_ymd(2024, 1, 15).unwrap();
    {
        let sheet = input.add_worksheet();
        sheet.write_string(0, 0, "备注").unwrap();
        sheet.write_datetime_with_format(1, 0, &date, &date_format).unwrap();
        sheet.set_column_width(0, 12).unwrap();
    }
    let input = input.save_to_buffer().unwrap();

    let out = glossary_processor()
        .translate_bytes("dates.xlsx", &input)
        .await
        .unwrap();

    let after = Workbook::from_bytes(&out.bytes).unwrap();
    let sheet = &after.sheets[0];
    assert_eq!(sheet.cell(0, 0).unwrap().value, CellValue::from("Remarks"));
    assert_eq!(sheet.cell(1, 0).unwrap().value, CellValue::Number(45306.0));

    // Measured as "2024-01-15 00:00:00", never narrower than the date needs
    let width = sheet.column_width(0).unwrap();
    assert_eq!(width, column_width("2024-01-15 00:00:00".len()));
    assert!(width > 12.0);

    let mut reader = read_back(&out.bytes);
    let range = reader.worksheet_range("Sheet1").unwrap();
    assert!(matches!(range.get_value((1, 0)), Some(Data::DateTime(_))));
}

#[tokio::test]
async fn test_unsupported_suffix_produces_nothing() {
    let err = glossary_processor()
        .translate_bytes("report.txt", b"name,note\n")
        .await
        .unwrap_err();

    assert!(matches!(err, TranslationError::UnsupportedShape { ref file_name } if file_name == "report.txt"));
    assert_eq!(err.code(), "unsupported_shape");
}

#[tokio::test]
async fn test_capability_pending() {
    let processor = DocumentProcessor::new(TranslationCapability::new(), ProcessorConfig::default());

    let err = processor
        .translate_bytes("people.csv", "name\n张三\n".as_bytes())
        .await
        .unwrap_err();

    assert!(matches!(err, TranslationError::CapabilityUnavailable { .. }));
}

struct NoChineseModel;

#[async_trait]
impl TranslationBackend for NoChineseModel {
    async fn translate(&self, text: &str, _pair: &LanguagePair) -> Result<String, BackendError> {
        Ok(text.to_string())
    }

    async fn supports(&self, _pair: &LanguagePair) -> Result<bool, BackendError> {
        Ok(false)
    }

    fn name(&self) -> &str {
        "no-chinese"
    }
}

#[tokio::test]
async fn test_capability_failed_install() {
    let capability = TranslationCapability::new();
    let installed = capability
        .install(Arc::new(NoChineseModel), &LanguagePair::zh_en())
        .await;
    assert!(installed.is_err());
    assert_eq!(capability.status().await, "unavailable");

    let processor = DocumentProcessor::new(capability, ProcessorConfig::default());
    let err = processor
        .translate_bytes("people.csv", "name\n张三\n".as_bytes())
        .await
        .unwrap_err();

    match err {
        TranslationError::CapabilityUnavailable { reason } => assert!(reason.contains("zh->en")),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_backend_failure_aborts() {
    let processor = processor_with(Arc::new(FailingBackend), ProcessorConfig::default());

    let err = processor
        .translate_bytes("people.csv", "name,note\n张三,你好\n".as_bytes())
        .await
        .unwrap_err();

    assert!(matches!(err, TranslationError::TranslationFailure { .. }));
}

#[tokio::test]
async fn test_keep_source_policy() {
    let config = ProcessorConfig::default().with_failure_policy(FailurePolicy::KeepSource);
    let processor = processor_with(Arc::new(FailingBackend), config);
    let input = "name,note\n张三,你好\n";

    let out = processor
        .translate_bytes("people.csv", input.as_bytes())
        .await
        .unwrap();

    assert_eq!(String::from_utf8(out.bytes).unwrap(), input);
    assert_eq!(out.report.failed, 2);
    assert_eq!(out.report.translated, 0);
}

#[tokio::test]
async fn test_corrupt_inputs() {
    let processor = glossary_processor();

    let err = processor
        .translate_bytes("broken.xlsx", b"PK\x03\x04 not really a zip")
        .await
        .unwrap_err();
    assert!(matches!(err, TranslationError::Deserialize { kind: DocumentKind::Workbook, .. }));

    let err = processor
        .translate_bytes("ragged.csv", b"a,b\n1,2,3\n")
        .await
        .unwrap_err();
    assert!(matches!(err, TranslationError::Deserialize { kind: DocumentKind::Table, .. }));
}

#[tokio::test]
async fn test_second_pass_is_a_no_op() {
    let backend = Arc::new(GlossaryBackend::default());
    let processor = processor_with(backend.clone(), ProcessorConfig::default());

    let first = processor
        .translate_bytes("people.csv", "name,note\n张三,你好\n张三,\n".as_bytes())
        .await
        .unwrap();
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

    let second = processor
        .translate_bytes("people.csv", &first.bytes)
        .await
        .unwrap();
    assert_eq!(second.bytes, first.bytes);
    assert_eq!(second.report.candidates, 0);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

    let workbook = processor
        .translate_bytes("report.xlsx", &styled_workbook())
        .await
        .unwrap();
    let calls = backend.calls.load(Ordering::SeqCst);
    let again = processor
        .translate_bytes("report.xlsx", &workbook.bytes)
        .await
        .unwrap();
    assert_eq!(backend.calls.load(Ordering::SeqCst), calls);

    let first_sheets = Workbook::from_bytes(&workbook.bytes).unwrap().sheets;
    let second_sheets = Workbook::from_bytes(&again.bytes).unwrap().sheets;
    for (a, b) in first_sheets.iter().zip(second_sheets.iter()) {
        let values_a: Vec<_> = a.cells().map(|(_, c)| c.value.clone()).collect();
        let values_b: Vec<_> = b.cells().map(|(_, c)| c.value.clone()).collect();
        assert_eq!(values_a, values_b);
    }
}

#[tokio::test]
async fn test_check_untranslated_workbook() {
    let leaks = glossary_processor()
        .check_untranslated("report.xlsx", &styled_workbook())
        .unwrap();

    let locations: Vec<&str> = leaks.iter().map(|l| l.location.as_str()).collect();
    assert_eq!(locations, vec!["Sheet1!A1", "Sheet1!A2", "备注!A1", "备注!A3"]);
    assert_eq!(leaks[0].original, "销售额");
}
