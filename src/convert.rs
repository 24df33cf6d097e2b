//! Best-effort column typing.
//!
//! Each column is tried as numeric, then date, then falls back to text. A kind
//! is accepted when at least `threshold` of the column's non-null values
//! coerce to it; the rest become nulls and are counted as failures. This is a
//! heuristic over cell text, not schema inference, and it can be wrong for
//! columns that mix kinds or use ambiguous date layouts.

use std::fmt::{Display, Formatter};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::model::{CellValue, Column, Table};
use crate::options::ConvertOptions;

const CURRENCY_SYMBOLS: &[char] = &['€', '$', '£', '¥'];

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?$")
        .expect("hardcoded number regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Date,
    Text,
}

impl Display for ColumnKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Numeric => "numeric",
            Self::Date => "date",
            Self::Text => "text",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnTypeGuess {
    pub column: String,
    pub kind: ColumnKind,
    pub coercion_failure_count: usize,
}

/// Parses numbers as they show up in statements: thousands separators,
/// currency symbols, a sign, and `(12.50)` for negatives.
pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let (negated, inner) = match trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let cleaned = inner
        .chars()
        .filter(|ch| !CURRENCY_SYMBOLS.contains(ch) && !ch.is_whitespace() && *ch != ',')
        .collect::<String>();
    if !NUMBER_RE.is_match(&cleaned) {
        return None;
    }

    let value = cleaned.parse::<f64>().ok().filter(|value| value.is_finite())?;
    Some(if negated { -value } else { value })
}

pub(crate) fn parse_date(raw: &str, formats: &[String]) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

fn coerce_numeric(value: &CellValue) -> Option<CellValue> {
    match value {
        CellValue::Number(_) => Some(value.clone()),
        CellValue::Text(text) => parse_number(text).map(CellValue::Number),
        CellValue::Null | CellValue::Date(_) => None,
    }
}

fn coerce_date(value: &CellValue, formats: &[String]) -> Option<CellValue> {
    match value {
        CellValue::Date(_) => Some(value.clone()),
        CellValue::Text(text) => parse_date(text, formats).map(CellValue::Date),
        CellValue::Null | CellValue::Number(_) => None,
    }
}

fn coerce_text(value: &CellValue) -> CellValue {
    match value {
        CellValue::Null | CellValue::Text(_) => value.clone(),
        other => CellValue::Text(other.to_string()),
    }
}

#[allow(clippy::cast_precision_loss)]
fn meets_threshold(successes: usize, non_null: usize, threshold: f64) -> bool {
    non_null > 0 && successes as f64 / non_null as f64 >= threshold
}

fn convert_column(column: Column, options: &ConvertOptions) -> (Column, ColumnTypeGuess) {
    let non_null = column.values.iter().filter(|value| !value.is_null()).count();

    let coerce_configured_date = |value: &CellValue| coerce_date(value, &options.date_formats);
    let attempts: [(ColumnKind, &dyn Fn(&CellValue) -> Option<CellValue>); 2] = [
        (ColumnKind::Numeric, &coerce_numeric),
        (ColumnKind::Date, &coerce_configured_date),
    ];

    for (kind, coerce) in attempts {
        let coerced = column.values.iter().map(coerce).collect::<Vec<_>>();
        let successes = coerced.iter().filter(|value| value.is_some()).count();
        if !meets_threshold(successes, non_null, options.threshold) {
            continue;
        }

        let values = coerced
            .into_iter()
            .map(|value| value.unwrap_or(CellValue::Null))
            .collect();
        let guess = ColumnTypeGuess {
            column: column.name.clone(),
            kind,
            coercion_failure_count: non_null - successes,
        };
        return (Column::new(column.name, values), guess);
    }

    let guess = ColumnTypeGuess {
        column: column.name.clone(),
        kind: ColumnKind::Text,
        coercion_failure_count: 0,
    };
    let values = column.values.iter().map(coerce_text).collect();
    (Column::new(column.name, values), guess)
}

/// Reclassifies every column and returns the typed table with one guess per
/// column, in column order.
#[must_use]
pub fn convert_types(table: Table, options: &ConvertOptions) -> (Table, Vec<ColumnTypeGuess>) {
    let source_page = table.source_page();
    let (columns, guesses): (Vec<_>, Vec<_>) = table
        .into_columns()
        .into_iter()
        .map(|column| convert_column(column, options))
        .unzip();

    for guess in &guesses {
        debug!(
            column = %guess.column,
            kind = %guess.kind,
            failures = guess.coercion_failure_count,
            "classified column"
        );
    }

    (Table::from_checked_columns(source_page, columns), guesses)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::{ColumnKind, convert_types, parse_number};
    use crate::model::{CellValue, Table};
    use crate::options::ConvertOptions;

    fn table(names: &[&str], rows: &[&[&str]]) -> Table {
        Table::from_rows(
            1,
            names.iter().map(|name| (*name).to_string()).collect(),
            rows.iter()
                .map(|row| {
                    row.iter()
                        .map(|cell| {
                            if cell.is_empty() {
                                CellValue::Null
                            } else {
                                CellValue::text(*cell)
                            }
                        })
                        .collect()
                })
                .collect(),
        )
        .expect("fixture table")
    }

    #[test]
    fn parses_statement_style_numbers() {
        assert_eq!(parse_number("1,234.50"), Some(1234.5));
        assert_eq!(parse_number("€ 12.00"), Some(12.0));
        assert_eq!(parse_number("(100)"), Some(-100.0));
        assert_eq!(parse_number("-3e2"), Some(-300.0));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("1e999"), None);
        assert_eq!(parse_number("12 apples"), None);
        assert_eq!(parse_number("2024-01-01"), None);
    }

    #[test]
    fn amount_is_numeric_with_one_failure_at_default_threshold() {
        let input = table(
            &["Date", "Amount"],
            &[&["2024-01-01", "100.50"], &["not-a-date", "oops"]],
        );

        let (converted, guesses) = convert_types(input, &ConvertOptions::default());
        let amount = &guesses[1];
        assert_eq!(amount.kind, ColumnKind::Numeric);
        assert_eq!(amount.coercion_failure_count, 1);
        assert_eq!(
            converted.column("Amount").expect("amount").values,
            vec![CellValue::Number(100.5), CellValue::Null]
        );

        // Exactly half the dates parse, which meets the default threshold.
        assert_eq!(guesses[0].kind, ColumnKind::Date);
        assert_eq!(guesses[0].coercion_failure_count, 1);
    }

    #[test]
    fn date_stays_text_below_threshold() {
        let input = table(
            &["Date"],
            &[&["2024-01-01"], &["not-a-date"], &["soon"]],
        );

        let (converted, guesses) = convert_types(input, &ConvertOptions::default());
        assert_eq!(guesses[0].kind, ColumnKind::Text);
        assert_eq!(guesses[0].coercion_failure_count, 0);
        assert_eq!(
            converted.column("Date").expect("date").values[1],
            CellValue::text("not-a-date")
        );
    }

    #[test]
    fn stricter_threshold_keeps_mixed_columns_as_text() {
        let options = ConvertOptions {
            threshold: 0.75,
            ..ConvertOptions::default()
        };
        let (_, guesses) = convert_types(
            table(&["Amount"], &[&["1"], &["2"], &["x"]]),
            &options,
        );
        assert_eq!(guesses[0].kind, ColumnKind::Text);
    }

    #[test]
    fn nulls_are_ignored_by_the_threshold() {
        let (converted, guesses) = convert_types(
            table(&["d", "empty"], &[&["31/12/2023", ""], &["", ""], &["01.02.2024", ""]]),
            &ConvertOptions::default(),
        );

        assert_eq!(guesses[0].kind, ColumnKind::Date);
        assert_eq!(guesses[0].coercion_failure_count, 0);
        assert_eq!(guesses[1].kind, ColumnKind::Text);
        assert_eq!(
            converted.column("d").expect("d").values[2],
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 2, 1).expect("valid date"))
        );
    }

    #[test]
    fn converting_twice_gives_the_same_kinds() {
        let input = table(&["n", "d"], &[&["1", "2024-05-01"], &["2", "2024-05-02"]]);
        let (once, first) = convert_types(input, &ConvertOptions::default());
        let (twice, second) = convert_types(once.clone(), &ConvertOptions::default());
        assert_eq!(first, second);
        assert_eq!(once, twice);
    }
}
