use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use tracing::info;

use crate::error::PipelineError;
use crate::model::Table;
use crate::output::{Payload, part_path};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// Prefix each file with a UTF-8 byte order mark, which some spreadsheet
    /// programs need to detect the encoding.
    pub bom: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            bom: false,
        }
    }
}

fn write_table<W: Write>(writer: W, table: &Table, delimiter: u8) -> Result<W, csv::Error> {
    let mut writer = WriterBuilder::new().delimiter(delimiter).from_writer(writer);
    writer.write_record(table.column_names())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(ToString::to_string))?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|error| csv::Error::from(error.into_error()))
}

fn write_file(path: &Path, table: &Table, options: CsvOptions) -> Result<(), PipelineError> {
    let mut file = File::create(path).map_err(|error| PipelineError::write(path, error))?;
    if options.bom {
        file.write_all(UTF8_BOM)
            .map_err(|error| PipelineError::write(path, error))?;
    }
    write_table(file, table, options.delimiter).map_err(|error| PipelineError::write(path, error))?;
    Ok(())
}

/// Writes one UTF-8 CSV per part: `path` for a whole table,
/// `<stem>_part<N>.csv` beside it for chunks. Returns the written paths.
pub fn export_csv(
    payload: Payload<'_>,
    path: &Path,
    options: CsvOptions,
) -> Result<Vec<PathBuf>, PipelineError> {
    let mut written = Vec::new();
    for part in payload.parts() {
        let target = part_path(path, part.index);
        write_file(&target, part.table, options)?;
        info!(path = %target.display(), rows = part.table.row_count(), "wrote csv");
        written.push(target);
    }
    Ok(written)
}

/// Renders a table to an in-memory CSV string.
pub fn write_csv_to_string(table: &Table, delimiter: u8) -> Result<String, PipelineError> {
    let bytes = write_table(Vec::new(), table, delimiter)
        .map_err(|error| PipelineError::write(Path::new("<memory>"), error))?;
    String::from_utf8(bytes)
        .map_err(|error| PipelineError::write(Path::new("<memory>"), error))
}
