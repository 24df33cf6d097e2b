use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use chrono::NaiveDate;

use crate::error::PipelineError;

/// A single cell. Extraction produces `Text` and `Null`; type conversion
/// introduces `Number` and `Date`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl CellValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub(crate) fn key(&self) -> CellKey<'_> {
        match self {
            Self::Null => CellKey::Null,
            Self::Text(value) => CellKey::Text(value),
            Self::Number(value) => CellKey::Number(value.to_bits()),
            Self::Date(value) => CellKey::Date(*value),
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Text(value) => f.write_str(value),
            #[allow(clippy::cast_possible_truncation)]
            Self::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{}", *value as i64)
            }
            Self::Number(value) => write!(f, "{value}"),
            Self::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
        }
    }
}

/// Hashable view of a cell, used for duplicate-row detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum CellKey<'a> {
    Null,
    Text(&'a str),
    Number(u64),
    Date(NaiveDate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<CellValue>,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<CellValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|value| value.is_null()).count()
    }
}

/// Column-major table. Construction enforces equal column lengths and unique
/// column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    source_page: i32,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(source_page: i32, columns: Vec<Column>) -> Result<Self, PipelineError> {
        if let Some(first) = columns.first() {
            let expected = first.values.len();
            if let Some(bad) = columns.iter().find(|column| column.values.len() != expected) {
                return Err(PipelineError::InvalidTable(format!(
                    "column '{}' has {} values, expected {expected}",
                    bad.name,
                    bad.values.len()
                )));
            }
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(PipelineError::InvalidTable(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }

        Ok(Self {
            source_page,
            columns,
        })
    }

    /// For stages that only drop whole rows and rename through
    /// [`dedupe_names`], which cannot break either invariant.
    pub(crate) fn from_checked_columns(source_page: i32, columns: Vec<Column>) -> Self {
        debug_assert!(Self::new(source_page, columns.clone()).is_ok());
        Self {
            source_page,
            columns,
        }
    }

    /// Builds a table from row-major cells. Short rows are padded with nulls,
    /// long rows are truncated to the header width.
    pub fn from_rows(
        source_page: i32,
        names: Vec<String>,
        rows: Vec<Vec<CellValue>>,
    ) -> Result<Self, PipelineError> {
        let width = names.len();
        let mut columns = names
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect::<Vec<_>>();

        for row in rows {
            let mut cells = row.into_iter();
            for column in &mut columns {
                column.values.push(cells.next().unwrap_or(CellValue::Null));
            }
        }

        debug_assert_eq!(columns.len(), width);
        Self::new(source_page, columns)
    }

    #[must_use]
    pub fn source_page(&self) -> i32 {
        self.source_page
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |column| column.values.len())
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    #[must_use]
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    #[must_use]
    pub fn row(&self, index: usize) -> Option<Vec<&CellValue>> {
        if index >= self.row_count() {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|column| &column.values[index])
                .collect(),
        )
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&CellValue>> + '_ {
        (0..self.row_count()).map(|index| {
            self.columns
                .iter()
                .map(|column| &column.values[index])
                .collect()
        })
    }

    /// Copies the given rows, in the given order, into a new table with the
    /// same columns.
    #[must_use]
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                Column::new(
                    column.name.clone(),
                    indices
                        .iter()
                        .map(|&index| column.values[index].clone())
                        .collect(),
                )
            })
            .collect();

        Self {
            source_page: self.source_page,
            columns,
        }
    }
}

/// Makes names unique in order by suffixing repeats with `_2`, `_3`, ...
pub(crate) fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut taken = HashSet::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 2_usize;
        while taken.contains(&candidate) {
            candidate = format!("{name}_{suffix}");
            suffix += 1;
        }
        taken.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

/// `col_1`, `col_2`, ...
pub(crate) fn positional_names(width: usize) -> Vec<String> {
    (1..=width).map(|index| format!("col_{index}")).collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{CellValue, Column, Table, dedupe_names};
    use crate::error::PipelineError;

    #[test]
    fn pads_short_rows_with_nulls() {
        let table = Table::from_rows(
            3,
            vec!["a".to_string(), "b".to_string()],
            vec![
                vec![CellValue::text("1")],
                vec![CellValue::text("2"), CellValue::text("3")],
            ],
        )
        .expect("table should build");

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.source_page(), 3);
        assert_eq!(table.row(0), Some(vec![&CellValue::text("1"), &CellValue::Null]));
    }

    #[test]
    fn rejects_ragged_columns_and_duplicate_names() {
        let ragged = Table::new(
            -1,
            vec![
                Column::new("a", vec![CellValue::Null]),
                Column::new("b", vec![]),
            ],
        );
        assert!(matches!(ragged, Err(PipelineError::InvalidTable(_))));

        let duplicate = Table::new(
            -1,
            vec![Column::new("a", vec![]), Column::new("a", vec![])],
        );
        assert!(matches!(duplicate, Err(PipelineError::InvalidTable(_))));
    }

    #[test]
    fn renders_numbers_and_dates() {
        assert_eq!(CellValue::Number(100.0).to_string(), "100");
        assert_eq!(CellValue::Number(100.5).to_string(), "100.5");
        assert_eq!(CellValue::Number(-3.0).to_string(), "-3");
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).expect("valid date");
        assert_eq!(CellValue::Date(date).to_string(), "2024-01-31");
        assert_eq!(CellValue::Null.to_string(), "");
    }

    #[test]
    fn dedupes_names_past_existing_suffixes() {
        let names = dedupe_names(vec![
            "a_2".to_string(),
            "a".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(names, vec!["a_2", "a", "a_3"]);
    }
}
