//! Turns the tables in a text-based PDF into cleaned, typed Excel and CSV
//! files, split into size-bounded chunks when the output would be large.
//!
//! The stages can be used on their own ([`extract`], [`clean`],
//! [`convert_types`], [`split`], [`export_excel`], [`export_csv`]) or chained
//! by [`run`].

mod chunk;
mod clean;
mod convert;
mod csv_out;
mod error;
mod extract;
mod header;
mod merge;
mod model;
mod options;
mod output;
mod pdf_reader;
mod pipeline;
mod table_detect;
mod table_parse;
mod warning;
mod xlsx_out;

pub use chunk::{Chunk, CsvSizeEstimator, SizeEstimator, split, split_with};
pub use clean::{ColumnNulls, QualityReport, clean};
pub use convert::{ColumnKind, ColumnTypeGuess, convert_types};
pub use csv_out::{CsvOptions, export_csv, write_csv_to_string};
pub use error::{PipelineError, Stage};
pub use extract::{Extraction, extract};
pub use model::{CellValue, Column, Table};
pub use options::{
    ConvertOptions, DEFAULT_CHUNK_SIZE_MB, DEFAULT_DATE_FORMATS, DEFAULT_TYPE_THRESHOLD,
    ExcelLayout, ExtractOptions, HeaderMode, PageSelection, PipelineOptions, QualityMode,
};
pub use output::Payload;
pub use pipeline::{RunSummary, run, run_with_options};
pub use warning::{PipelineWarning, WarningCode};
pub use xlsx_out::{EXCEL_MAX_COLUMNS, EXCEL_MAX_DATA_ROWS, ExcelOptions, WorkbookSummary, export_excel};
