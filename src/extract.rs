use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::PipelineError;
use crate::header::build_table;
use crate::model::Table;
use crate::options::{ExtractOptions, QualityMode};
use crate::pdf_reader::{PageText, read_pdf_text};
use crate::table_detect::{DetectedTable, LOW_CONFIDENCE_THRESHOLD, detect_tables};
use crate::warning::{PipelineWarning, WarningCode};

/// Tables found in one PDF, in page order then in-page order.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub source: PathBuf,
    pub tables: Vec<Table>,
    pub warnings: Vec<PipelineWarning>,
}

impl Extraction {
    /// Turns an empty extraction into [`PipelineError::NoTablesFound`].
    pub fn require_tables(self) -> Result<Self, PipelineError> {
        if self.tables.is_empty() {
            return Err(PipelineError::NoTablesFound { path: self.source });
        }
        Ok(self)
    }
}

fn apply_quality_mode(
    tables: Vec<DetectedTable>,
    mode: QualityMode,
    warnings: &mut Vec<PipelineWarning>,
) -> Vec<DetectedTable> {
    let mut out = Vec::new();

    for table in tables {
        if table.confidence >= LOW_CONFIDENCE_THRESHOLD {
            out.push(table);
            continue;
        }

        match mode {
            QualityMode::BestEffort => {
                warnings.push(
                    PipelineWarning::new(
                        WarningCode::LowConfidence,
                        "table confidence is low; exported in best-effort mode",
                    )
                    .with_page(table.page)
                    .with_confidence(table.confidence),
                );
                out.push(table);
            }
            QualityMode::SkipAmbiguous => {
                warn!(page = table.page, confidence = table.confidence, "skipping low-confidence table");
                warnings.push(
                    PipelineWarning::new(
                        WarningCode::SkippedAmbiguousTable,
                        "skipping low-confidence table",
                    )
                    .with_page(table.page)
                    .with_confidence(table.confidence),
                );
            }
        }
    }

    out
}

pub(crate) fn extract_from_text(
    source: &Path,
    pages: &[PageText],
    full_text: Option<&str>,
    options: &ExtractOptions,
) -> Result<Extraction, PipelineError> {
    let mut warnings = Vec::new();
    let mut detected = detect_tables(pages, options.min_cols);

    if detected.is_empty()
        && let Some(text) = full_text.filter(|text| !text.trim().is_empty())
    {
        let fallback_pages = [PageText {
            page_number: 1,
            text: text.to_string(),
        }];
        let fallback = detect_tables(&fallback_pages, options.min_cols);
        if !fallback.is_empty() {
            warnings.push(PipelineWarning::new(
                WarningCode::DocumentTextFallback,
                "no page-level tables detected; retried with document-level text extraction",
            ));
            detected = fallback;
        }
    }

    let detected = apply_quality_mode(detected, options.quality_mode, &mut warnings);

    let mut tables = Vec::with_capacity(detected.len());
    for (index, table) in detected.into_iter().enumerate() {
        let table = build_table(table, options.header_mode, index + 1, &mut warnings)?;
        if table.row_count() > 0 {
            tables.push(table);
        }
    }

    if tables.is_empty() {
        warn!(source = %source.display(), "no table rows were detected");
        warnings.push(PipelineWarning::new(
            WarningCode::NoTablesDetected,
            "no table rows were detected in the selected pages",
        ));
    }

    Ok(Extraction {
        source: source.to_path_buf(),
        tables,
        warnings,
    })
}

/// Reads `pdf_path` and returns every detected table.
///
/// An unreadable or non-PDF path fails with
/// [`PipelineError::SourceUnreadable`]. Finding nothing is not an error: the
/// result is empty and carries a [`WarningCode::NoTablesDetected`] warning.
pub fn extract(pdf_path: &Path, options: &ExtractOptions) -> Result<Extraction, PipelineError> {
    let document = read_pdf_text(pdf_path, options.pages.as_ref())?;
    let extraction = extract_from_text(
        pdf_path,
        &document.pages,
        document.full_text.as_deref(),
        options,
    )?;

    info!(
        source = %pdf_path.display(),
        pages = document.pages.len(),
        tables = extraction.tables.len(),
        "extracted tables"
    );
    Ok(extraction)
}
