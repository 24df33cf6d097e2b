use std::ops::Range;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use rust_xlsxwriter::{Color, ExcelDateTime, Format, FormatBorder, Workbook, Worksheet, XlsxError};
use tracing::{debug, info};

use crate::clean::QualityReport;
use crate::convert::ColumnTypeGuess;
use crate::error::PipelineError;
use crate::model::{CellValue, Table};
use crate::options::ExcelLayout;
use crate::output::{Part, Payload, part_path};
use crate::warning::{PipelineWarning, WarningCode};

/// Excel allows 1,048,576 rows per worksheet; one goes to the header.
pub const EXCEL_MAX_DATA_ROWS: usize = 1_048_575;
pub const EXCEL_MAX_COLUMNS: usize = 16_384;
pub const EXCEL_MAX_CELL_CHARS: usize = 32_767;

const MIN_COLUMN_WIDTH: usize = 8;
const MAX_COLUMN_WIDTH: usize = 60;
const WIDTH_SAMPLE_ROWS: usize = 1_000;
const HEADER_FILL: u32 = 0x1F4E78;
const SUMMARY_SHEET: &str = "Summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExcelOptions {
    pub layout: ExcelLayout,
    /// Rows past this count continue on another worksheet.
    pub max_rows_per_sheet: usize,
}

impl Default for ExcelOptions {
    fn default() -> Self {
        Self {
            layout: ExcelLayout::FilePerChunk,
            max_rows_per_sheet: EXCEL_MAX_DATA_ROWS,
        }
    }
}

/// Run facts written to a trailing "Summary" worksheet.
#[derive(Debug, Clone, Copy)]
pub struct WorkbookSummary<'a> {
    pub source: &'a Path,
    pub quality: &'a QualityReport,
    pub type_guesses: &'a [ColumnTypeGuess],
}

struct Formats {
    header: Format,
    date: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new()
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(HEADER_FILL))
                .set_border(FormatBorder::Thin),
            date: Format::new().set_num_format("yyyy-mm-dd"),
        }
    }
}

/// Row ranges for each worksheet of a table. Always at least one range.
pub(crate) fn sheet_slices(row_count: usize, max_rows: usize) -> Vec<Range<usize>> {
    let max_rows = max_rows.max(1);
    if row_count == 0 {
        return vec![0..0];
    }
    (0..row_count)
        .step_by(max_rows)
        .map(|start| start..(start + max_rows).min(row_count))
        .collect()
}

fn sheet_name(label: &str, slice_index: usize) -> String {
    if slice_index == 0 {
        label.to_string()
    } else {
        format!("{label} ({})", slice_index + 1)
    }
}

#[allow(clippy::cast_precision_loss)]
fn column_width(table: &Table, column: usize, rows: &Range<usize>) -> f64 {
    let data = &table.columns()[column];
    let widest = data.values[rows.clone()]
        .iter()
        .take(WIDTH_SAMPLE_ROWS)
        .map(|value| value.to_string().chars().count())
        .chain(std::iter::once(data.name.chars().count()))
        .max()
        .unwrap_or(0);
    (widest + 2).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH) as f64
}

/// Excel's 1900 date system cannot hold years outside 1900..=9999.
#[allow(clippy::cast_possible_truncation)]
fn excel_date(date: NaiveDate) -> Option<ExcelDateTime> {
    if !(1900..=9999).contains(&date.year()) {
        return None;
    }
    let year = u16::try_from(date.year()).ok()?;
    ExcelDateTime::from_ymd(year, date.month() as u8, date.day() as u8).ok()
}

/// Longest prefix of `text` that fits in one Excel cell.
fn cell_text(text: &str) -> &str {
    text.char_indices()
        .nth(EXCEL_MAX_CELL_CHARS)
        .map_or(text, |(end, _)| &text[..end])
}

/// One warning per column holding text the workbook has to cut short.
pub(crate) fn truncated_cell_warnings(table: &Table) -> Vec<PipelineWarning> {
    table
        .columns()
        .iter()
        .filter_map(|column| {
            let truncated = column
                .values
                .iter()
                .filter(|value| match value {
                    CellValue::Text(text) => text.chars().count() > EXCEL_MAX_CELL_CHARS,
                    _ => false,
                })
                .count();
            (truncated > 0).then(|| {
                PipelineWarning::new(
                    WarningCode::TruncatedCell,
                    format!(
                        "{truncated} cell(s) in column '{}' exceed {EXCEL_MAX_CELL_CHARS} characters; truncated in the workbook",
                        column.name
                    ),
                )
            })
        })
        .collect()
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
    formats: &Formats,
) -> Result<(), XlsxError> {
    match value {
        CellValue::Null => {}
        CellValue::Text(text) => {
            worksheet.write_string(row, col, cell_text(text))?;
        }
        CellValue::Number(number) => {
            worksheet.write_number(row, col, *number)?;
        }
        CellValue::Date(date) => match excel_date(*date) {
            Some(datetime) => {
                worksheet.write_datetime_with_format(row, col, &datetime, &formats.date)?;
            }
            None => {
                worksheet.write_string(row, col, value.to_string())?;
            }
        },
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn data_sheet(
    name: &str,
    table: &Table,
    rows: &Range<usize>,
    formats: &Formats,
) -> Result<Worksheet, XlsxError> {
    let mut worksheet = Worksheet::new();
    worksheet.set_name(name)?;

    // Column count is checked against EXCEL_MAX_COLUMNS and row count against
    // the sheet slice size before we get here, so both casts are lossless.
    for (col, column) in table.columns().iter().enumerate() {
        let col = col as u16;
        worksheet.write_string_with_format(0, col, cell_text(&column.name), &formats.header)?;
        worksheet.set_column_width(col, column_width(table, col as usize, rows))?;
        for (offset, value) in column.values[rows.clone()].iter().enumerate() {
            write_cell(&mut worksheet, offset as u32 + 1, col, value, formats)?;
        }
    }

    if let Some(last_col) = table.column_count().checked_sub(1) {
        worksheet.set_freeze_panes(1, 0)?;
        worksheet.autofilter(0, 0, rows.len() as u32, last_col as u16)?;
    }
    Ok(worksheet)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn summary_sheet(
    summary: &WorkbookSummary<'_>,
    parts: &[Part<'_>],
    part_total: usize,
    sheet_rows: &[(String, usize)],
    formats: &Formats,
) -> Result<Worksheet, XlsxError> {
    let mut worksheet = Worksheet::new();
    worksheet.set_name(SUMMARY_SHEET)?;
    worksheet.set_column_width(0, 24)?;
    worksheet.set_column_width(1, 40)?;

    let quality = summary.quality;
    let rows_written: usize = parts.iter().map(|part| part.table.row_count()).sum();
    let mut metrics = vec![
        ("source", summary.source.display().to_string()),
        ("rows_before", quality.rows_before.to_string()),
        ("rows_after", quality.rows_after.to_string()),
        ("duplicates_removed", quality.duplicates_removed.to_string()),
        ("null_cells", quality.total_nulls().to_string()),
        ("rows_in_workbook", rows_written.to_string()),
    ];
    let indices = parts.iter().filter_map(|part| part.index).collect::<Vec<_>>();
    if let [index] = indices.as_slice() {
        metrics.push(("part", format!("{index} of {part_total}")));
    } else if !indices.is_empty() {
        metrics.push(("parts", indices.len().to_string()));
    }

    worksheet.write_string_with_format(0, 0, "metric", &formats.header)?;
    worksheet.write_string_with_format(0, 1, "value", &formats.header)?;
    let mut row = 1_u32;
    for (metric, value) in metrics {
        worksheet.write_string(row, 0, metric)?;
        worksheet.write_string(row, 1, value)?;
        row += 1;
    }

    row += 1;
    worksheet.write_string_with_format(row, 0, "sheet", &formats.header)?;
    worksheet.write_string_with_format(row, 1, "rows", &formats.header)?;
    for (name, rows) in sheet_rows {
        row += 1;
        worksheet.write_string(row, 0, name)?;
        worksheet.write_number(row, 1, *rows as f64)?;
    }

    row += 2;
    for (col, title) in ["column", "kind", "nulls", "coercion_failures"].iter().enumerate() {
        worksheet.write_string_with_format(row, col as u16, *title, &formats.header)?;
    }
    for guess in summary.type_guesses {
        row += 1;
        let nulls = quality.nulls_for(&guess.column).unwrap_or(0);
        worksheet.write_string(row, 0, &guess.column)?;
        worksheet.write_string(row, 1, guess.kind.to_string())?;
        worksheet.write_number(row, 2, nulls as f64)?;
        worksheet.write_number(row, 3, guess.coercion_failure_count as f64)?;
    }
    Ok(worksheet)
}

fn save_workbook(
    path: &Path,
    sheets: &[(String, &Table)],
    options: &ExcelOptions,
    summary: Option<(&WorkbookSummary<'_>, &[Part<'_>], usize)>,
) -> Result<(), XlsxError> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();
    let mut sheet_rows = Vec::new();

    for (label, table) in sheets {
        for (slice_index, rows) in sheet_slices(table.row_count(), options.max_rows_per_sheet)
            .into_iter()
            .enumerate()
        {
            let name = sheet_name(label, slice_index);
            debug!(sheet = %name, rows = rows.len(), "writing worksheet");
            workbook.push_worksheet(data_sheet(&name, table, &rows, &formats)?);
            sheet_rows.push((name, rows.len()));
        }
    }

    if let Some((summary, parts, part_total)) = summary {
        workbook.push_worksheet(summary_sheet(
            summary,
            parts,
            part_total,
            &sheet_rows,
            &formats,
        )?);
    }

    workbook.save(path)
}

/// Writes the payload as `.xlsx`. With [`ExcelLayout::FilePerChunk`] each
/// chunk gets its own `<stem>_part<N>.xlsx`; with
/// [`ExcelLayout::SheetPerChunk`] a single workbook at `path` holds one
/// worksheet per chunk. A whole table always goes to `path`.
pub fn export_excel(
    payload: Payload<'_>,
    path: &Path,
    options: &ExcelOptions,
    summary: Option<&WorkbookSummary<'_>>,
) -> Result<Vec<PathBuf>, PipelineError> {
    let parts = payload.parts();
    if let Some(part) = parts
        .iter()
        .find(|part| part.table.column_count() > EXCEL_MAX_COLUMNS)
    {
        return Err(PipelineError::InvalidTable(format!(
            "{} columns exceed the Excel limit of {EXCEL_MAX_COLUMNS}",
            part.table.column_count()
        )));
    }

    let part_total = parts.len();
    let workbooks: Vec<(PathBuf, Vec<Part<'_>>)> = match (options.layout, payload) {
        (_, Payload::Table(_)) => vec![(path.to_path_buf(), parts)],
        (ExcelLayout::SheetPerChunk, Payload::Chunks(_)) => vec![(path.to_path_buf(), parts)],
        (ExcelLayout::FilePerChunk, Payload::Chunks(_)) => parts
            .into_iter()
            .map(|part| (part_path(path, part.index), vec![part]))
            .collect(),
    };

    let mut written = Vec::with_capacity(workbooks.len());
    for (target, parts) in workbooks {
        let sheets = parts
            .iter()
            .map(|part| {
                let label = match (options.layout, part.index) {
                    (ExcelLayout::SheetPerChunk, Some(index)) => format!("Part {index}"),
                    _ => "Data".to_string(),
                };
                (label, part.table)
            })
            .collect::<Vec<_>>();

        save_workbook(
            &target,
            &sheets,
            options,
            summary.map(|summary| (summary, parts.as_slice(), part_total)),
        )
        .map_err(|error| PipelineError::write(&target, error))?;

        info!(path = %target.display(), sheets = sheets.len(), "wrote workbook");
        written.push(target);
    }
    Ok(written)
}
