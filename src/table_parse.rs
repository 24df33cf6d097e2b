use std::collections::HashMap;

/// Splits a text line into cells on tabs and runs of two or more spaces.
/// Single spaces stay inside a cell.
pub(crate) fn split_line_into_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut whitespace_run = 0_usize;

    let flush = |current: &mut String, cells: &mut Vec<String>| {
        let cell = current.trim();
        if !cell.is_empty() {
            cells.push(cell.to_string());
        }
        current.clear();
    };

    for ch in trimmed.chars() {
        if ch == '\t' {
            flush(&mut current, &mut cells);
            whitespace_run = 0;
        } else if ch.is_whitespace() {
            whitespace_run += 1;
            if whitespace_run == 2 {
                flush(&mut current, &mut cells);
            } else if whitespace_run == 1 {
                current.push(' ');
            }
        } else {
            whitespace_run = 0;
            current.push(ch);
        }
    }
    flush(&mut current, &mut cells);

    cells
}

pub(crate) fn soft_split_line_into_cells(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Decides whether a line is a table row and returns its cells.
///
/// The strict split wins when it yields `min_cols` cells. Otherwise a
/// single-space split is accepted for lines that do not read like prose:
/// no closing sentence punctuation, and either a digit somewhere or at most
/// six words.
pub(crate) fn row_cells(line: &str, min_cols: usize) -> Option<Vec<String>> {
    let cells = split_line_into_cells(line);
    if cells.len() >= min_cols {
        return Some(cells);
    }

    let soft_cells = soft_split_line_into_cells(line);
    let has_numeric = soft_cells
        .iter()
        .any(|cell| cell.chars().any(|ch| ch.is_ascii_digit()));
    let looks_like_sentence = ['.', '!', '?']
        .iter()
        .any(|punctuation| line.trim_end().ends_with(*punctuation));

    (soft_cells.len() >= min_cols && !looks_like_sentence && (has_numeric || soft_cells.len() <= 6))
        .then_some(soft_cells)
}

pub(crate) fn modal_width(rows: &[Vec<String>]) -> usize {
    let mut freq = HashMap::new();
    for width in rows.iter().map(Vec::len) {
        *freq.entry(width).or_insert(0_usize) += 1;
    }

    freq.into_iter()
        .max_by_key(|(width, count)| (*count, *width))
        .map_or(0, |(width, _)| width)
}
