use crate::error::PipelineError;
use crate::model::{CellValue, Table, dedupe_names, positional_names};
use crate::options::HeaderMode;
use crate::table_detect::DetectedTable;
use crate::warning::{PipelineWarning, WarningCode};

const HEADER_CONFIDENCE_THRESHOLD: f32 = 0.55;

fn is_numeric(value: &str) -> bool {
    let trimmed = value.trim().replace(',', "");
    !trimmed.is_empty()
        && trimmed.chars().any(|ch| ch.is_ascii_digit())
        && trimmed.parse::<f64>().is_ok()
}

#[allow(clippy::cast_precision_loss)]
fn non_numeric_ratio(cells: &[String]) -> f32 {
    if cells.is_empty() {
        return 0.0;
    }

    let non_numeric = cells.iter().filter(|cell| !is_numeric(cell)).count();
    non_numeric as f32 / cells.len() as f32
}

/// A first row that is mostly text above a second row that is mostly
/// numbers reads as a header.
pub(crate) fn infer_has_header(rows: &[Vec<String>]) -> (bool, f32) {
    if rows.is_empty() {
        return (false, 0.0);
    }

    let first = non_numeric_ratio(&rows[0]);
    let second = rows.get(1).map_or(0.0, |row| non_numeric_ratio(row));

    let confidence = (first * 0.6 + (1.0 - second) * 0.4).clamp(0.0, 1.0);
    let has_header = first >= 0.6 && second <= 0.7;
    (has_header, confidence)
}

fn header_names(cells: &[String], width: usize) -> Vec<String> {
    let names = (0..width)
        .map(|index| {
            cells
                .get(index)
                .map(|cell| cell.trim())
                .filter(|cell| !cell.is_empty())
                .map_or_else(|| format!("col_{}", index + 1), str::to_string)
        })
        .collect();
    dedupe_names(names)
}

/// Turns a detected table into a typed [`Table`], consuming the header row
/// when `mode` says there is one.
pub(crate) fn build_table(
    detected: DetectedTable,
    mode: HeaderMode,
    table_id: usize,
    warnings: &mut Vec<PipelineWarning>,
) -> Result<Table, PipelineError> {
    let has_header = match mode {
        HeaderMode::HasHeader => true,
        HeaderMode::NoHeader => false,
        HeaderMode::AutoDetect => {
            let (has_header, confidence) = infer_has_header(&detected.rows);
            if confidence < HEADER_CONFIDENCE_THRESHOLD {
                warnings.push(
                    PipelineWarning::new(
                        WarningCode::HeaderInferenceLowConfidence,
                        "header inference confidence is low; keeping the first row as data",
                    )
                    .with_page(detected.page)
                    .with_table_id(table_id)
                    .with_confidence(confidence),
                );
                false
            } else {
                has_header
            }
        }
    };

    let width = detected.rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut rows = detected.rows.into_iter();
    let names = if has_header {
        let header = rows.next().unwrap_or_default();
        header_names(&header, width)
    } else {
        positional_names(width)
    };

    let rows = rows
        .map(|row| row.into_iter().map(CellValue::Text).collect())
        .collect();

    Table::from_rows(i32::try_from(detected.page).unwrap_or(-1), names, rows)
}
