use std::path::{Path, PathBuf};

use crate::chunk::Chunk;
use crate::model::Table;

/// What an exporter writes: a whole table, or the chunks it was split into.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Table(&'a Table),
    Chunks(&'a [Chunk]),
}

/// One unit of output: the table plus its 1-based part number when chunked.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Part<'a> {
    pub index: Option<usize>,
    pub table: &'a Table,
}

impl<'a> Payload<'a> {
    pub(crate) fn parts(self) -> Vec<Part<'a>> {
        match self {
            Self::Table(table) => vec![Part { index: None, table }],
            Self::Chunks(chunks) => chunks
                .iter()
                .map(|chunk| Part {
                    index: Some(chunk.chunk_index),
                    table: &chunk.table,
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn row_count(self) -> usize {
        self.parts().iter().map(|part| part.table.row_count()).sum()
    }
}

/// `<dir>/<stem>_part<N>.<ext>` for chunk `N`, the path itself otherwise.
pub(crate) fn part_path(path: &Path, index: Option<usize>) -> PathBuf {
    let Some(index) = index else {
        return path.to_path_buf();
    };

    let stem = path
        .file_stem()
        .map_or_else(|| "output".to_string(), |stem| stem.to_string_lossy().into_owned());
    let file_name = match path.extension() {
        Some(extension) => format!("{stem}_part{index}.{}", extension.to_string_lossy()),
        None => format!("{stem}_part{index}"),
    };
    path.with_file_name(file_name)
}
