use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::model::{CellKey, CellValue, Column, Table, dedupe_names};

const NULL_MARKERS: &[&str] = &["nan", "null", "none", "n/a"];

static NAME_SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\p{L}\p{N}]+").expect("hardcoded column separator regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnNulls {
    pub column: String,
    pub nulls: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct QualityReport {
    pub rows_before: usize,
    pub rows_after: usize,
    pub duplicates_removed: usize,
    /// Per-column null counts after cleaning, in column order.
    pub nulls_per_column: Vec<ColumnNulls>,
}

impl QualityReport {
    #[must_use]
    pub fn nulls_for(&self, column: &str) -> Option<usize> {
        self.nulls_per_column
            .iter()
            .find(|entry| entry.column == column)
            .map(|entry| entry.nulls)
    }

    #[must_use]
    pub fn total_nulls(&self) -> usize {
        self.nulls_per_column.iter().map(|entry| entry.nulls).sum()
    }
}

fn clean_cell(value: CellValue) -> CellValue {
    match value {
        CellValue::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty()
                || NULL_MARKERS
                    .iter()
                    .any(|marker| trimmed.eq_ignore_ascii_case(marker))
            {
                CellValue::Null
            } else if trimmed.len() == text.len() {
                CellValue::Text(text)
            } else {
                CellValue::Text(trimmed.to_string())
            }
        }
        other => other,
    }
}

/// Lower snake case; anything that is not a letter or digit separates words.
pub(crate) fn normalize_column_name(name: &str, position: usize) -> String {
    let lowered = name.trim().to_lowercase();
    let normalized = NAME_SEPARATOR_RE.replace_all(&lowered, "_");
    let normalized = normalized.trim_matches('_');
    if normalized.is_empty() {
        format!("col_{}", position + 1)
    } else {
        normalized.to_string()
    }
}

fn duplicate_rows(columns: &[Column], row_count: usize) -> Vec<bool> {
    let mut seen: HashSet<Vec<CellKey<'_>>> = HashSet::with_capacity(row_count);
    (0..row_count)
        .map(|row| {
            let key = columns
                .iter()
                .map(|column| column.values[row].key())
                .collect::<Vec<_>>();
            !seen.insert(key)
        })
        .collect()
}

/// Trims text cells, turns blanks and null markers into nulls, drops repeated
/// rows (first occurrence wins) and normalizes column names.
///
/// Rows are compared after trimming, so cleaning an already clean table
/// changes nothing.
#[must_use]
pub fn clean(table: Table) -> (Table, QualityReport) {
    let rows_before = table.row_count();
    let source_page = table.source_page();

    let mut columns = table
        .into_columns()
        .into_iter()
        .map(|column| Column {
            name: column.name,
            values: column.values.into_iter().map(clean_cell).collect(),
        })
        .collect::<Vec<_>>();

    let duplicates = duplicate_rows(&columns, rows_before);
    let duplicates_removed = duplicates.iter().filter(|is_dup| **is_dup).count();
    if duplicates_removed > 0 {
        for column in &mut columns {
            let mut flags = duplicates.iter();
            column
                .values
                .retain(|_| !flags.next().copied().unwrap_or(false));
        }
    }

    let names = dedupe_names(
        columns
            .iter()
            .enumerate()
            .map(|(position, column)| normalize_column_name(&column.name, position))
            .collect(),
    );
    for (column, name) in columns.iter_mut().zip(names) {
        column.name = name;
    }

    let nulls_per_column = columns
        .iter()
        .map(|column| ColumnNulls {
            column: column.name.clone(),
            nulls: column.null_count(),
        })
        .collect();

    let rows_after = rows_before - duplicates_removed;
    let cleaned = Table::from_checked_columns(source_page, columns);

    (
        cleaned,
        QualityReport {
            rows_before,
            rows_after,
            duplicates_removed,
            nulls_per_column,
        },
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{clean, normalize_column_name};
    use crate::model::{CellValue, Table};

    fn table(names: &[&str], rows: &[&[&str]]) -> Table {
        Table::from_rows(
            1,
            names.iter().map(|name| (*name).to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|cell| CellValue::text(*cell)).collect())
                .collect(),
        )
        .expect("fixture table")
    }

    #[test]
    fn removes_duplicates_keeping_first_occurrence() {
        let input = table(
            &["Name", "Amount"],
            &[
                &["alice", "1"],
                &["bob", "2"],
                &["alice", "1"],
                &["carol", "3"],
                &["bob", "2"],
                &["alice", "1"],
            ],
        );

        let (cleaned, report) = clean(input);
        assert_eq!(report.duplicates_removed, 3);
        assert_eq!(report.rows_before, 6);
        assert_eq!(report.rows_after, 3);
        let names = cleaned
            .column("name")
            .expect("name column")
            .values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn trims_text_and_counts_missing_values() {
        let input = table(
            &["Desc", "Debit"],
            &[&["  coffee ", ""], &["tea", "N/A"], &["cake", "4"]],
        );

        let (cleaned, report) = clean(input);
        assert_eq!(
            cleaned.row(0).expect("first row"),
            vec![&CellValue::text("coffee"), &CellValue::Null]
        );
        assert_eq!(report.nulls_for("debit"), Some(2));
        assert_eq!(report.nulls_for("desc"), Some(0));
        assert_eq!(report.total_nulls(), 2);
    }

    #[test]
    fn rows_differing_only_in_padding_are_duplicates() {
        let (cleaned, report) = clean(table(&["a"], &[&["x"], &[" x "]]));
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(cleaned.row_count(), 1);
    }

    #[test]
    fn normalizes_and_disambiguates_column_names() {
        let (cleaned, _) = clean(table(
            &["Transaction Date", "Amount (€)", "amount", "", "日期"],
            &[&["1", "2", "3", "4", "5"]],
        ));
        assert_eq!(
            cleaned.column_names(),
            vec!["transaction_date", "amount", "amount_2", "col_4", "日期"]
        );
        assert_eq!(normalize_column_name("--", 0), "col_1");
    }

    #[test]
    fn cleaning_is_idempotent() {
        let input = table(
            &["Name ", "Name", "Value"],
            &[
                &[" a", "b", ""],
                &["a", "b ", "null"],
                &["c", "d", "1"],
                &["c", "d", "1"],
            ],
        );

        let (once, _) = clean(input);
        let (twice, report) = clean(once.clone());
        assert_eq!(twice, once);
        assert_eq!(report.duplicates_removed, 0);
    }
}
