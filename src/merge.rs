use std::collections::HashMap;

use tracing::debug;

use crate::clean::normalize_column_name;
use crate::error::PipelineError;
use crate::model::{CellValue, Column, Table, dedupe_names, positional_names};

pub(crate) const SOURCE_FILE_COLUMN: &str = "source_file";
pub(crate) const PAGE_COLUMN: &str = "page";
pub(crate) const TABLE_ID_COLUMN: &str = "table_id";

fn has_positional_names(table: &Table) -> bool {
    table.column_names() == positional_names(table.column_count())
}

/// Merge key of every column in every table. Names are normalized the way
/// [`crate::clean`] normalizes them. A headerless table as wide as the one
/// before it continues that table and takes its keys.
fn merge_keys(tables: &[Table]) -> Vec<Vec<String>> {
    let mut keys: Vec<Vec<String>> = Vec::with_capacity(tables.len());
    for (index, table) in tables.iter().enumerate() {
        let continued = keys.last().filter(|previous| {
            has_positional_names(table) && previous.len() == table.column_count()
        });
        let table_keys = match continued {
            Some(previous) => {
                debug!(table_id = index + 1, "appending headerless table to the previous one");
                previous.clone()
            }
            None => dedupe_names(
                table
                    .column_names()
                    .iter()
                    .enumerate()
                    .map(|(position, name)| normalize_column_name(name, position))
                    .collect(),
            ),
        };
        keys.push(table_keys);
    }
    keys
}

/// Unions tables by normalized column name in first-seen order. Cells a
/// table does not have stay null. With `source_name`, three provenance
/// columns lead the result: source file, page, and 1-based table id.
pub(crate) fn merge_tables(
    tables: &[Table],
    source_name: Option<&str>,
) -> Result<Table, PipelineError> {
    let keys = merge_keys(tables);
    let mut names: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for name in keys.iter().flatten() {
        if !positions.contains_key(name) {
            positions.insert(name.clone(), names.len());
            names.push(name.clone());
        }
    }

    let total_rows = tables.iter().map(Table::row_count).sum();
    let mut data = names
        .iter()
        .map(|_| Vec::with_capacity(total_rows))
        .collect::<Vec<Vec<CellValue>>>();
    let mut source_files = Vec::with_capacity(total_rows);
    let mut pages = Vec::with_capacity(total_rows);
    let mut table_ids = Vec::with_capacity(total_rows);

    for (index, (table, table_keys)) in tables.iter().zip(&keys).enumerate() {
        let rows = table.row_count();
        let mut filled = vec![false; names.len()];
        for (column, key) in table.columns().iter().zip(table_keys) {
            let position = positions[key];
            data[position].extend(column.values.iter().cloned());
            filled[position] = true;
        }
        for (position, was_filled) in filled.into_iter().enumerate() {
            if !was_filled {
                data[position].extend(std::iter::repeat_n(CellValue::Null, rows));
            }
        }

        if let Some(source) = source_name {
            source_files.extend(std::iter::repeat_n(CellValue::text(source), rows));
            pages.extend(std::iter::repeat_n(
                CellValue::text(table.source_page().to_string()),
                rows,
            ));
            table_ids.extend(std::iter::repeat_n(
                CellValue::text((index + 1).to_string()),
                rows,
            ));
        }
    }

    let mut columns = Vec::with_capacity(names.len() + 3);
    if source_name.is_some() {
        columns.push(Column::new(SOURCE_FILE_COLUMN, source_files));
        columns.push(Column::new(PAGE_COLUMN, pages));
        columns.push(Column::new(TABLE_ID_COLUMN, table_ids));
    }
    columns.extend(
        names
            .into_iter()
            .zip(data)
            .map(|(name, values)| Column::new(name, values)),
    );

    let unique = dedupe_names(columns.iter().map(|column| column.name.clone()).collect());
    for (column, name) in columns.iter_mut().zip(unique) {
        column.name = name;
    }

    let source_page = match tables.first().map(Table::source_page) {
        Some(page) if tables.iter().all(|table| table.source_page() == page) => page,
        _ => -1,
    };

    Table::new(source_page, columns)
}
