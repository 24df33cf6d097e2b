use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::PipelineError;

pub const DEFAULT_CHUNK_SIZE_MB: f64 = 25.0;
pub const DEFAULT_TYPE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%m-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMode {
    AutoDetect,
    HasHeader,
    NoHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityMode {
    BestEffort,
    SkipAmbiguous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcelLayout {
    /// One workbook per chunk, named `<base>_part<N>.xlsx`.
    FilePerChunk,
    /// One workbook holding a worksheet per chunk.
    SheetPerChunk,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct PageSelection {
    pages: BTreeSet<u32>,
}

impl PageSelection {
    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl FromStr for PageSelection {
    type Err = String;

    fn from_str(selection: &str) -> Result<Self, Self::Err> {
        let mut pages = BTreeSet::new();
        for token in selection.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some((start, end)) = token.split_once('-') {
                let start: u32 = start
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid page range start: '{start}'"))?;
                let end: u32 = end
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid page range end: '{end}'"))?;
                if start == 0 || end == 0 {
                    return Err("pages are 1-based".to_string());
                }
                if end < start {
                    return Err(format!(
                        "invalid range '{token}': end is smaller than start"
                    ));
                }
                pages.extend(start..=end);
            } else {
                let page: u32 = token
                    .parse()
                    .map_err(|_| format!("invalid page number: '{token}'"))?;
                if page == 0 {
                    return Err("pages are 1-based".to_string());
                }
                pages.insert(page);
            }
        }

        if pages.is_empty() {
            return Err("page selection cannot be empty".to_string());
        }

        Ok(Self { pages })
    }
}

impl TryFrom<String> for PageSelection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    pub pages: Option<PageSelection>,
    pub header_mode: HeaderMode,
    pub quality_mode: QualityMode,
    pub min_cols: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            pages: None,
            header_mode: HeaderMode::AutoDetect,
            quality_mode: QualityMode::BestEffort,
            min_cols: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Fraction of non-null values that must coerce for a column to take a kind.
    pub threshold: f64,
    /// chrono `strftime` patterns, tried in order.
    pub date_formats: Vec<String>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_TYPE_THRESHOLD,
            date_formats: DEFAULT_DATE_FORMATS
                .iter()
                .map(|format| (*format).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub chunk_size_mb: f64,
    pub excel_name: Option<String>,
    pub csv_name: Option<String>,
    pub output_dir: PathBuf,
    pub type_threshold: f64,
    pub date_formats: Vec<String>,
    pub include_meta: bool,
    pub require_tables: bool,
    pub excel_layout: ExcelLayout,
    pub csv_delimiter: char,
    pub csv_bom: bool,
    pub extraction: ExtractOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        let convert = ConvertOptions::default();
        Self {
            chunk_size_mb: DEFAULT_CHUNK_SIZE_MB,
            excel_name: None,
            csv_name: None,
            output_dir: PathBuf::from("output"),
            type_threshold: convert.threshold,
            date_formats: convert.date_formats,
            include_meta: true,
            require_tables: false,
            excel_layout: ExcelLayout::FilePerChunk,
            csv_delimiter: ',',
            csv_bom: false,
            extraction: ExtractOptions::default(),
        }
    }
}

impl PipelineOptions {
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|error| PipelineError::Config {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|error| PipelineError::Config {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.chunk_budget_bytes()?;

        if !(self.type_threshold > 0.0 && self.type_threshold <= 1.0) {
            return Err(PipelineError::InvalidOption(format!(
                "type_threshold must be in (0, 1], got {}",
                self.type_threshold
            )));
        }
        if self.extraction.min_cols < 2 {
            return Err(PipelineError::InvalidOption(
                "min_cols must be at least 2".to_string(),
            ));
        }
        if !self.csv_delimiter.is_ascii() || matches!(self.csv_delimiter, '"' | '\n' | '\r') {
            return Err(PipelineError::InvalidOption(format!(
                "csv_delimiter must be a single ASCII character other than quote or newline, got {:?}",
                self.csv_delimiter
            )));
        }
        Ok(())
    }

    /// `chunk_size_mb` in bytes, rounded up so that any positive size gives a
    /// non-zero budget.
    pub fn chunk_budget_bytes(&self) -> Result<u64, PipelineError> {
        if !self.chunk_size_mb.is_finite() || self.chunk_size_mb <= 0.0 {
            return Err(PipelineError::InvalidBudget(format!(
                "chunk_size_mb must be a positive number, got {}",
                self.chunk_size_mb
            )));
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bytes = (self.chunk_size_mb * BYTES_PER_MB).ceil() as u64;
        Ok(bytes.max(1))
    }

    #[must_use]
    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            threshold: self.type_threshold,
            date_formats: self.date_formats.clone(),
        }
    }

    /// Output base name for a format: the override when given (with any
    /// extension stripped), otherwise the PDF stem.
    #[must_use]
    pub fn base_name(&self, pdf_path: &Path, override_name: Option<&str>) -> String {
        override_name
            .map(|name| {
                Path::new(name)
                    .file_stem()
                    .map_or_else(|| name.to_string(), |stem| stem.to_string_lossy().into_owned())
            })
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| {
                pdf_path
                    .file_stem()
                    .map_or_else(|| "output".to_string(), |stem| stem.to_string_lossy().into_owned())
            })
    }
}
