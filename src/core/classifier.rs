//! Decides which cell values need translation

use crate::document::CellValue;

/// First code point of the CJK Unified Ideographs block
const CJK_START: char = '\u{4E00}';
/// Last code point of the CJK Unified Ideographs block
const CJK_END: char = '\u{9FFF}';

/// Check if a character is a CJK unified ideograph
pub fn is_cjk(c: char) -> bool {
    (CJK_START..=CJK_END).contains(&c)
}

/// Check if text contains at least one CJK unified ideograph
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// True iff `value` is a non-empty string holding CJK text
pub fn requires_translation(value: &CellValue) -> bool {
    match value {
        CellValue::String(s) => !s.is_empty() && contains_cjk(s),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_boundaries() {
        assert!(is_cjk('\u{4E00}'));
        assert!(is_cjk('\u{9FFF}'));
        assert!(!is_cjk('\u{4DFF}'));
        assert!(!is_cjk('\u{A000}'));
    }

    #[test]
    fn test_strings() {
        assert!(requires_translation(&CellValue::from("销售额")));
        assert!(requires_translation(&CellValue::from("Q1 销售")));
        assert!(!requires_translation(&CellValue::from("Sales")));
        assert!(!requires_translation(&CellValue::from("")));
        // Hiragana and fullwidth punctuation sit outside the range
        assert!(!requires_translation(&CellValue::from("こんにちは")));
        assert!(!requires_translation(&CellValue::from("，。")));
    }

    #[test]
    fn test_non_strings() {
        assert!(!requires_translation(&CellValue::Empty));
        assert!(!requires_translation(&CellValue::Number(100.0)));
        assert!(!requires_translation(&CellValue::Bool(true)));
        assert!(!requires_translation(&CellValue::Formula("\"你好\"&A1".to_string())));
        assert!(!requires_translation(&CellValue::Other("#N/A".to_string())));
    }
}
