use std::borrow::Cow;

use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::model::{CellValue, Table};

/// Approximates how many bytes a table takes once serialized.
///
/// Implementations must be deterministic and monotone: adding a row never
/// lowers the estimate. The splitter only ever asks for the header and for
/// single rows, so a whole-table estimate is their sum.
pub trait SizeEstimator {
    fn header_size(&self, table: &Table) -> u64;

    fn row_size(&self, table: &Table, row: usize) -> u64;

    fn estimate_size(&self, table: &Table) -> u64 {
        (0..table.row_count()).fold(self.header_size(table), |total, row| {
            total + self.row_size(table, row)
        })
    }
}

/// Counts the bytes of the CSV rendering: cell text, delimiters, quoting and
/// one newline per line.
#[derive(Debug, Clone, Copy)]
pub struct CsvSizeEstimator {
    pub delimiter: char,
}

impl Default for CsvSizeEstimator {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

impl CsvSizeEstimator {
    fn field_size(&self, text: &str) -> u64 {
        let needs_quotes = text
            .chars()
            .any(|ch| ch == self.delimiter || matches!(ch, '"' | '\n' | '\r'));
        let len = text.len() as u64;
        if needs_quotes {
            len + 2 + text.matches('"').count() as u64
        } else {
            len
        }
    }

    fn line_size<'a>(&self, fields: impl Iterator<Item = Cow<'a, str>>) -> u64 {
        let mut total = 0_u64;
        let mut count = 0_u64;
        for field in fields {
            total += self.field_size(&field);
            count += 1;
        }
        total + count.saturating_sub(1) + 1
    }
}

fn render(value: &CellValue) -> Cow<'_, str> {
    match value {
        CellValue::Text(text) => Cow::Borrowed(text.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

impl SizeEstimator for CsvSizeEstimator {
    fn header_size(&self, table: &Table) -> u64 {
        self.line_size(
            table
                .columns()
                .iter()
                .map(|column| Cow::Borrowed(column.name.as_str())),
        )
    }

    fn row_size(&self, table: &Table, row: usize) -> u64 {
        self.line_size(
            table
                .columns()
                .iter()
                .map(|column| render(&column.values[row])),
        )
    }
}

/// A contiguous run of rows from a split table. `chunk_index` starts at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub chunk_index: usize,
    pub size_bytes: u64,
    pub table: Table,
}

/// Splits `table` into chunks whose estimated CSV size stays within
/// `max_bytes`.
pub fn split(table: &Table, max_bytes: u64) -> Result<Vec<Chunk>, PipelineError> {
    split_with(table, max_bytes, &CsvSizeEstimator::default())
}

/// Greedy split: rows are added in order until the next one would push the
/// estimate past `max_bytes`, then a new chunk starts with that row. A row
/// that is too large on its own still gets a chunk of its own. A table with
/// no rows gives one empty chunk.
pub fn split_with(
    table: &Table,
    max_bytes: u64,
    estimator: &dyn SizeEstimator,
) -> Result<Vec<Chunk>, PipelineError> {
    if max_bytes == 0 {
        return Err(PipelineError::InvalidBudget(
            "max_bytes must be positive".to_string(),
        ));
    }

    let header = estimator.header_size(table);
    let mut chunks = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_size = header;

    let close = |rows: &mut Vec<usize>, size: u64, chunks: &mut Vec<Chunk>| {
        let chunk_index = chunks.len() + 1;
        if size > max_bytes {
            warn!(chunk_index, size_bytes = size, max_bytes, "single row exceeds the chunk budget");
        }
        chunks.push(Chunk {
            chunk_index,
            size_bytes: size,
            table: table.select_rows(rows),
        });
        rows.clear();
    };

    for row in 0..table.row_count() {
        let row_size = estimator.row_size(table, row);
        if !current.is_empty() && current_size + row_size > max_bytes {
            close(&mut current, current_size, &mut chunks);
            current_size = header;
        }
        current.push(row);
        current_size += row_size;
    }

    if !current.is_empty() || chunks.is_empty() {
        close(&mut current, current_size, &mut chunks);
    }

    debug!(rows = table.row_count(), chunks = chunks.len(), max_bytes, "split table");
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{CsvSizeEstimator, SizeEstimator, split};
    use crate::error::PipelineError;
    use crate::model::{CellValue, Table};

    fn table(rows: &[&[&str]]) -> Table {
        Table::from_rows(
            -1,
            vec!["id".to_string(), "name".to_string()],
            rows.iter()
                .map(|row| row.iter().map(|cell| CellValue::text(*cell)).collect())
                .collect(),
        )
        .expect("fixture table")
    }

    fn numbered(count: usize) -> Table {
        Table::from_rows(
            -1,
            vec!["id".to_string(), "name".to_string()],
            (0..count)
                .map(|index| {
                    vec![
                        CellValue::text(format!("{index:04}")),
                        CellValue::text(format!("name-{}", "x".repeat(index % 7))),
                    ]
                })
                .collect(),
        )
        .expect("fixture table")
    }

    fn row_ids(table: &Table) -> Vec<String> {
        table.rows().map(|row| row[0].to_string()).collect()
    }

    #[test]
    fn estimates_csv_bytes_with_quoting() {
        let input = table(&[&["1", "plain"], &["2", "has, comma"], &["3", "say \"hi\""]]);
        let estimator = CsvSizeEstimator::default();

        assert_eq!(estimator.header_size(&input), "id,name\n".len() as u64);
        assert_eq!(estimator.row_size(&input, 0), "1,plain\n".len() as u64);
        assert_eq!(estimator.row_size(&input, 1), "2,\"has, comma\"\n".len() as u64);
        assert_eq!(
            estimator.row_size(&input, 2),
            "3,\"say \"\"hi\"\"\"\n".len() as u64
        );
    }

    #[test]
    fn five_equal_rows_with_a_two_row_budget_split_two_two_one() {
        let input = table(&[
            &["1", "aaaa"],
            &["2", "bbbb"],
            &["3", "cccc"],
            &["4", "dddd"],
            &["5", "eeee"],
        ]);
        let budget = CsvSizeEstimator::default().estimate_size(&input.select_rows(&[0, 1]));

        let chunks = split(&input, budget).expect("split should succeed");
        let sizes = chunks
            .iter()
            .map(|chunk| chunk.table.row_count())
            .collect::<Vec<_>>();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(
            chunks.iter().map(|chunk| chunk.chunk_index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(chunks.iter().all(|chunk| chunk.size_bytes <= budget));
    }

    #[test]
    fn chunks_partition_rows_in_order() {
        let input = numbered(97);
        for budget in [20, 64, 150, 1_000, 100_000] {
            let chunks = split(&input, budget).expect("split should succeed");
            let rejoined = chunks
                .iter()
                .flat_map(|chunk| row_ids(&chunk.table))
                .collect::<Vec<_>>();
            assert_eq!(rejoined, row_ids(&input), "budget {budget}");
        }
    }

    #[test]
    fn larger_budgets_never_produce_more_chunks() {
        let input = numbered(60);
        let mut previous = usize::MAX;
        for budget in (10..400).step_by(7) {
            let count = split(&input, budget).expect("split should succeed").len();
            assert!(count <= previous, "budget {budget} gave {count} > {previous}");
            previous = count;
        }
    }

    #[test]
    fn oversized_row_is_passed_through_alone() {
        let long = "z".repeat(500);
        let input = table(&[&["1", "a"], &["2", long.as_str()], &["3", "b"]]);
        let chunks = split(&input, 40).expect("split should succeed");

        assert_eq!(chunks.len(), 3);
        assert_eq!(row_ids(&chunks[1].table), vec!["2"]);
        assert!(chunks[1].size_bytes > 40);
        assert!(chunks[0].size_bytes <= 40 && chunks[2].size_bytes <= 40);
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert!(matches!(
            split(&table(&[&["1", "a"]]), 0),
            Err(PipelineError::InvalidBudget(_))
        ));
    }

    #[test]
    fn empty_table_gives_one_empty_chunk() {
        let chunks = split(&table(&[]), 10).expect("split should succeed");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].table.row_count(), 0);
        assert_eq!(chunks[0].table.column_names(), vec!["id", "name"]);
    }
}
