use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::chunk::{Chunk, CsvSizeEstimator, SizeEstimator, split_with};
use crate::clean::{QualityReport, clean};
use crate::convert::{ColumnTypeGuess, convert_types};
use crate::csv_out::{CsvOptions, export_csv};
use crate::error::{PipelineError, Stage};
use crate::extract::{Extraction, extract};
use crate::merge::merge_tables;
use crate::options::PipelineOptions;
use crate::output::Payload;
use crate::warning::{PipelineWarning, WarningCode};
use crate::xlsx_out::{ExcelOptions, WorkbookSummary, export_excel, truncated_cell_warnings};

/// What a run did, in a shape that serializes straight to JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub source: PathBuf,
    pub tables_found: usize,
    pub rows_written: usize,
    pub quality: QualityReport,
    pub type_guesses: Vec<ColumnTypeGuess>,
    /// Sum of per-column coercion failures.
    pub coercion_failures: usize,
    pub chunk_count: usize,
    pub excel_files: Vec<PathBuf>,
    pub csv_files: Vec<PathBuf>,
    pub warnings: Vec<PipelineWarning>,
}

impl RunSummary {
    fn empty(source: &Path, warnings: Vec<PipelineWarning>) -> Self {
        Self {
            source: source.to_path_buf(),
            tables_found: 0,
            rows_written: 0,
            quality: QualityReport::default(),
            type_guesses: Vec::new(),
            coercion_failures: 0,
            chunk_count: 0,
            excel_files: Vec::new(),
            csv_files: Vec::new(),
            warnings,
        }
    }

    #[must_use]
    pub fn has_rows(&self) -> bool {
        self.rows_written > 0
    }
}

fn in_stage(stage: Stage, input: &Path) -> impl FnOnce(PipelineError) -> PipelineError + '_ {
    move |error| error.in_stage(stage, input)
}

fn oversized_warnings(chunks: &[Chunk], budget: u64) -> Vec<PipelineWarning> {
    chunks
        .iter()
        .filter(|chunk| chunk.size_bytes > budget)
        .map(|chunk| {
            PipelineWarning::new(
                WarningCode::OversizedRow,
                format!(
                    "chunk holds a single row of ~{} bytes, over the {budget} byte budget",
                    chunk.size_bytes
                ),
            )
            .with_chunk_index(chunk.chunk_index)
        })
        .collect()
}

/// Everything after extraction: merge, clean, convert, split and export.
pub(crate) fn process_extraction(
    extraction: Extraction,
    output_dir: &Path,
    options: &PipelineOptions,
) -> Result<RunSummary, PipelineError> {
    let pdf_path = extraction.source.as_path();
    let mut warnings = extraction.warnings;

    if extraction.tables.is_empty() {
        info!(source = %pdf_path.display(), "no tables found; nothing written");
        return Ok(RunSummary::empty(pdf_path, warnings));
    }
    let tables_found = extraction.tables.len();

    let source_name = options.include_meta.then(|| {
        pdf_path
            .file_name()
            .map_or_else(|| pdf_path.display().to_string(), |name| name.to_string_lossy().into_owned())
    });
    let merged = merge_tables(&extraction.tables, source_name.as_deref())
        .map_err(in_stage(Stage::Merge, pdf_path))?;
    info!(stage = %Stage::Merge, tables = tables_found, rows = merged.row_count(), "merged tables");

    let (cleaned, quality) = clean(merged);
    info!(
        stage = %Stage::Clean,
        rows_before = quality.rows_before,
        rows_after = quality.rows_after,
        duplicates_removed = quality.duplicates_removed,
        "cleaned table"
    );

    let (typed, type_guesses) = convert_types(cleaned, &options.convert_options());
    let coercion_failures: usize = type_guesses
        .iter()
        .map(|guess| guess.coercion_failure_count)
        .sum();
    info!(stage = %Stage::Convert, coercion_failures, "converted column types");

    let budget = options
        .chunk_budget_bytes()
        .map_err(in_stage(Stage::Split, pdf_path))?;
    let estimator = CsvSizeEstimator {
        delimiter: options.csv_delimiter,
    };
    let estimate = estimator.estimate_size(&typed);
    let chunks = if estimate > budget {
        let chunks =
            split_with(&typed, budget, &estimator).map_err(in_stage(Stage::Split, pdf_path))?;
        info!(stage = %Stage::Split, estimate, budget, chunks = chunks.len(), "split table");
        Some(chunks)
    } else {
        None
    };
    if let Some(chunks) = &chunks {
        let oversized = oversized_warnings(chunks, budget);
        if !oversized.is_empty() {
            warn!(count = oversized.len(), "chunks exceed the size budget");
        }
        warnings.extend(oversized);
    }

    let payload = match &chunks {
        Some(chunks) => Payload::Chunks(chunks),
        None => Payload::Table(&typed),
    };

    let truncated = truncated_cell_warnings(&typed);
    if !truncated.is_empty() {
        warn!(columns = truncated.len(), "text cells exceed the Excel cell limit");
    }
    warnings.extend(truncated);

    let excel_path = output_dir.join(format!(
        "{}.xlsx",
        options.base_name(pdf_path, options.excel_name.as_deref())
    ));
    let excel_options = ExcelOptions {
        layout: options.excel_layout,
        ..ExcelOptions::default()
    };
    let workbook_summary = WorkbookSummary {
        source: pdf_path,
        quality: &quality,
        type_guesses: &type_guesses,
    };
    let excel_files = export_excel(payload, &excel_path, &excel_options, Some(&workbook_summary))
        .map_err(in_stage(Stage::ExportExcel, pdf_path))?;

    let csv_path = output_dir.join(format!(
        "{}.csv",
        options.base_name(pdf_path, options.csv_name.as_deref())
    ));
    let csv_options = CsvOptions {
        delimiter: u8::try_from(options.csv_delimiter).map_err(|_| {
            PipelineError::InvalidOption(format!(
                "csv_delimiter {:?} is not a single byte",
                options.csv_delimiter
            ))
        })?,
        bom: options.csv_bom,
    };
    let csv_files =
        export_csv(payload, &csv_path, csv_options).map_err(in_stage(Stage::ExportCsv, pdf_path))?;

    Ok(RunSummary {
        source: pdf_path.to_path_buf(),
        tables_found,
        rows_written: payload.row_count(),
        quality,
        type_guesses,
        coercion_failures,
        chunk_count: chunks.as_ref().map_or(1, Vec::len),
        excel_files,
        csv_files,
        warnings,
    })
}

/// Converts one PDF into cleaned Excel and CSV files under `output_dir`.
///
/// Options are validated before anything touches the filesystem. Stage
/// failures come back as [`PipelineError::Stage`]; files already written by
/// earlier stages are left in place. A PDF without tables yields an empty
/// summary and no files unless `require_tables` is set.
pub fn run(
    pdf_path: &Path,
    output_dir: &Path,
    options: &PipelineOptions,
) -> Result<RunSummary, PipelineError> {
    options.validate()?;
    std::fs::create_dir_all(output_dir).map_err(|error| PipelineError::write(output_dir, error))?;

    info!(stage = %Stage::Extract, source = %pdf_path.display(), "starting run");
    let mut extraction =
        extract(pdf_path, &options.extraction).map_err(in_stage(Stage::Extract, pdf_path))?;
    if options.require_tables {
        extraction = extraction
            .require_tables()
            .map_err(in_stage(Stage::Extract, pdf_path))?;
    }

    let summary = process_extraction(extraction, output_dir, options)?;
    info!(
        source = %pdf_path.display(),
        rows = summary.rows_written,
        chunks = summary.chunk_count,
        files = summary.excel_files.len() + summary.csv_files.len(),
        "run finished"
    );
    Ok(summary)
}

/// [`run`] with the output directory taken from `options.output_dir`.
pub fn run_with_options(
    pdf_path: &Path,
    options: &PipelineOptions,
) -> Result<RunSummary, PipelineError> {
    run(pdf_path, &options.output_dir, options)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::process_extraction;
    use crate::convert::ColumnKind;
    use crate::extract::extract_from_text;
    use crate::options::{ExtractOptions, PipelineOptions};
    use crate::pdf_reader::PageText;
    use crate::warning::WarningCode;

    fn extraction(pages: &[&str]) -> crate::extract::Extraction {
        let pages = pages
            .iter()
            .zip(1..)
            .map(|(text, page_number)| PageText {
                page_number,
                text: (*text).to_string(),
            })
            .collect::<Vec<_>>();
        extract_from_text(
            Path::new("/in/bank.pdf"),
            &pages,
            None,
            &ExtractOptions::default(),
        )
        .expect("extraction should succeed")
    }

    #[test]
    fn writes_one_workbook_and_csv_when_under_budget() {
        let dir = tempdir().expect("tempdir should be created");
        let summary = process_extraction(
            extraction(&["Date  Amount  Memo\n2024-01-01  1,200.00  rent\n2024-01-02  (15.00)  fee\n2024-01-02  (15.00)  fee"]),
            dir.path(),
            &PipelineOptions::default(),
        )
        .expect("run should succeed");

        assert_eq!(summary.tables_found, 1);
        assert_eq!(summary.quality.duplicates_removed, 1);
        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.chunk_count, 1);
        assert_eq!(summary.excel_files, vec![dir.path().join("bank.xlsx")]);
        assert_eq!(summary.csv_files, vec![dir.path().join("bank.csv")]);

        let kinds = summary
            .type_guesses
            .iter()
            .map(|guess| (guess.column.as_str(), guess.kind))
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                ("source_file", ColumnKind::Text),
                ("page", ColumnKind::Numeric),
                ("table_id", ColumnKind::Numeric),
                ("date", ColumnKind::Date),
                ("amount", ColumnKind::Numeric),
                ("memo", ColumnKind::Text),
            ]
        );

        let csv = std::fs::read_to_string(dir.path().join("bank.csv")).expect("csv should exist");
        assert_eq!(
            csv,
            "source_file,page,table_id,date,amount,memo\n\
             bank.pdf,1,1,2024-01-01,1200,rent\n\
             bank.pdf,1,1,2024-01-02,-15,fee\n"
        );
    }

    #[test]
    fn splits_and_flags_oversized_rows_under_a_tiny_budget() {
        let dir = tempdir().expect("tempdir should be created");
        let options = PipelineOptions {
            chunk_size_mb: 0.000_01,
            include_meta: false,
            csv_name: Some("rows.csv".to_string()),
            ..PipelineOptions::default()
        };
        let summary = process_extraction(
            extraction(&["Item  Price\nTea  2.50\nCake  4.00\nPie  3.25"]),
            dir.path(),
            &options,
        )
        .expect("run should succeed");

        assert_eq!(summary.chunk_count, 3);
        assert_eq!(
            summary.csv_files,
            vec![
                dir.path().join("rows_part1.csv"),
                dir.path().join("rows_part2.csv"),
                dir.path().join("rows_part3.csv"),
            ]
        );
        assert_eq!(summary.excel_files.len(), 3);
        assert_eq!(
            summary
                .warnings
                .iter()
                .filter(|warning| warning.code == WarningCode::OversizedRow)
                .count(),
            3
        );
    }

    #[test]
    fn empty_extraction_writes_nothing() {
        let dir = tempdir().expect("tempdir should be created");
        let summary = process_extraction(
            extraction(&["Nothing tabular here."]),
            dir.path(),
            &PipelineOptions::default(),
        )
        .expect("run should succeed");

        assert!(!summary.has_rows());
        assert_eq!(summary.chunk_count, 0);
        assert!(summary.excel_files.is_empty() && summary.csv_files.is_empty());
        assert_eq!(
            std::fs::read_dir(dir.path())
                .expect("dir should be readable")
                .count(),
            0
        );
    }
}
