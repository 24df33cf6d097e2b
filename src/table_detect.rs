use crate::pdf_reader::PageText;
use crate::table_parse::{modal_width, row_cells};

pub(crate) const LOW_CONFIDENCE_THRESHOLD: f32 = 0.60;

/// A run of consecutive row-like lines on one page.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DetectedTable {
    pub page: u32,
    pub rows: Vec<Vec<String>>,
    pub confidence: f32,
}

/// Row-width consistency in `[0, 1]`: three quarters share of rows at the
/// modal width, one quarter spread between the narrowest and widest row.
#[allow(clippy::cast_precision_loss)]
fn table_confidence(rows: &[Vec<String>]) -> f32 {
    if rows.len() < 2 {
        return 0.0;
    }

    let modal = modal_width(rows);
    if modal == 0 {
        return 0.0;
    }

    let consistent =
        rows.iter().filter(|row| row.len() == modal).count() as f32 / rows.len() as f32;
    let max_width = rows.iter().map(Vec::len).max().unwrap_or(modal);
    let min_width = rows.iter().map(Vec::len).min().unwrap_or(modal);
    let uniformity = if max_width == 0 {
        0.0
    } else {
        1.0 - ((max_width - min_width) as f32 / max_width as f32)
    };

    (consistent * 0.75 + uniformity * 0.25).clamp(0.0, 1.0)
}

fn detect_tables_in_page(page: &PageText, min_cols: usize) -> Vec<DetectedTable> {
    let mut tables = Vec::new();
    let mut current_rows: Vec<Vec<String>> = Vec::new();

    let flush_current = |rows: &mut Vec<Vec<String>>, tables: &mut Vec<DetectedTable>| {
        if rows.len() >= 2 {
            let confidence = table_confidence(rows);
            tables.push(DetectedTable {
                page: page.page_number,
                rows: std::mem::take(rows),
                confidence,
            });
        } else {
            rows.clear();
        }
    };

    for line in page.text.lines() {
        match row_cells(line, min_cols) {
            Some(cells) => current_rows.push(cells),
            None => flush_current(&mut current_rows, &mut tables),
        }
    }

    flush_current(&mut current_rows, &mut tables);
    tables
}

/// Detects tables page by page, in page order then in-page order.
pub(crate) fn detect_tables(pages: &[PageText], min_cols: usize) -> Vec<DetectedTable> {
    pages
        .iter()
        .flat_map(|page| detect_tables_in_page(page, min_cols.max(2)))
        .collect()
}
