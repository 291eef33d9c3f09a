//! Column-width reflow for workbook sheets

use crate::document::{Document, Sheet};

/// Characters added to the longest value of a column
pub const WIDTH_PADDING: usize = 2;
/// Character-to-width factor
pub const WIDTH_FACTOR: f64 = 1.2;

/// Display width for a column whose longest value has `max_len` characters
pub fn column_width(max_len: usize) -> f64 {
    (max_len + WIDTH_PADDING) as f64 * WIDTH_FACTOR
}

/// Recompute the width of every column from its final cell contents.
///
/// Columns run from the left-most to the right-most column holding a cell;
/// a gap column with only empty cells gets the width of a zero-length value.
/// Columns left of the first cell and sheets with no cells are left alone.
pub fn reflow(sheet: &mut Sheet) {
    let Some(first) = sheet.cells().map(|(_, c)| c.column as usize).min() else {
        return;
    };

    let mut max_lens = vec![0usize; sheet.column_count() - first];
    for (_, cell) in sheet.cells() {
        let slot = &mut max_lens[cell.column as usize - first];
        *slot = (*slot).max(sheet.display_len(cell));
    }

    for (offset, max_len) in max_lens.into_iter().enumerate() {
        sheet.set_column_width((first + offset) as u32, column_width(max_len));
    }
}

/// Reflow every sheet of a workbook; tables have no column widths
pub fn reflow_document(document: &mut Document) {
    if let Document::Workbook(workbook) = document {
        for sheet in &mut workbook.sheets {
            reflow(sheet);
        }
    }
}
