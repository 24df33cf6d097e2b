use std::collections::BTreeMap;
use std::path::Path;

use encoding_rs::{BIG5, UTF_16BE};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use tracing::debug;

use crate::error::PipelineError;
use crate::options::PageSelection;
use crate::table_parse::row_cells;

/// Plain text of one PDF page, 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageText {
    pub page_number: u32,
    pub text: String,
}

/// Page texts plus the whole-document text `pdf-extract` produced, kept for
/// the document-level fallback.
#[derive(Debug, Clone, Default)]
pub(crate) struct DocumentText {
    pub pages: Vec<PageText>,
    pub full_text: Option<String>,
}

fn split_text_into_pages(raw_text: &str) -> Vec<String> {
    let mut pages = raw_text
        .split('\u{000C}')
        .map(str::to_string)
        .collect::<Vec<_>>();
    if pages.last().is_some_and(String::is_empty) {
        pages.pop();
    }
    pages
}

fn looks_decoding_broken(text: &str) -> bool {
    if text.contains("?Identity-H Unimplemented?") {
        return true;
    }

    let total = text.chars().count();
    if total == 0 {
        return false;
    }

    let replacement = text.matches('\u{FFFD}').count();
    let control = text
        .chars()
        .filter(|ch| ch.is_control() && !matches!(ch, '\n' | '\r' | '\t'))
        .count();

    replacement * 8 > total || control * 5 > total
}

fn decode_pdf_bytes(encoding: Option<&str>, bytes: &[u8]) -> String {
    let decoded = Document::decode_text(encoding, bytes);
    if !looks_decoding_broken(&decoded) {
        return decoded;
    }

    if bytes.starts_with(&[0xFE, 0xFF]) || bytes.starts_with(&[0xFF, 0xFE]) {
        let bytes = if bytes.len() > 2 { &bytes[2..] } else { bytes };
        let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(bytes);
        if !had_errors && !utf16.is_empty() {
            return utf16.into_owned();
        }
    }

    if let Some(name) = encoding {
        let lower = name.to_ascii_lowercase();

        if ["utf16", "ucs2", "identity-h", "unicode"]
            .iter()
            .any(|hint| lower.contains(hint))
        {
            let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(bytes);
            if !had_errors && !utf16.is_empty() {
                return utf16.into_owned();
            }
        }

        if ["big5", "b5", "eten", "cns"]
            .iter()
            .any(|hint| lower.contains(hint))
        {
            let (big5, _, had_errors) = BIG5.decode(bytes);
            if !had_errors && !big5.is_empty() {
                return big5.into_owned();
            }
        }
    }

    String::from_utf8_lossy(bytes).to_string()
}

/// Ranks candidate texts for one page. Lines that split into table rows
/// dominate the score; lines with digits add a little; garbled decoding is
/// heavily penalised.
fn table_likeness_score(text: &str) -> i64 {
    if text.trim().is_empty() {
        return i64::MIN / 4;
    }

    let mut non_empty_lines = 0_i64;
    let mut row_lines = 0_i64;
    let mut numeric_lines = 0_i64;

    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        non_empty_lines += 1;
        if row_cells(line, 2).is_some() {
            row_lines += 1;
        }
        if line.chars().any(|ch| ch.is_ascii_digit()) {
            numeric_lines += 1;
        }
    }

    let broken_penalty = if looks_decoding_broken(text) { 800 } else { 0 };
    row_lines * 50 + numeric_lines * 15 + non_empty_lines - broken_penalty
}

fn choose_best_text(candidates: Vec<String>) -> String {
    candidates
        .into_iter()
        .max_by_key(|text| table_likeness_score(text))
        .unwrap_or_default()
}

fn extract_text_from_page_content(document: &Document, page_id: ObjectId) -> Option<String> {
    fn collect_text(text: &mut String, encoding: Option<&str>, operands: &[Object]) {
        for operand in operands {
            match operand {
                Object::String(bytes, _) => {
                    text.push_str(&decode_pdf_bytes(encoding, bytes));
                }
                Object::Array(items) => {
                    collect_text(text, encoding, items);
                    text.push(' ');
                }
                Object::Integer(value) if *value < -100 => text.push(' '),
                _ => {}
            }
        }
    }

    let raw_content = document.get_page_content(page_id).ok()?;
    let content = Content::decode(&raw_content).ok()?;
    let encodings = document
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, font.get_font_encoding()))
        .collect::<BTreeMap<Vec<u8>, &str>>();

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_encoding = None;
    for operation in content.operations {
        match operation.operator.as_str() {
            "Tf" => {
                if let Some(font_name) = operation
                    .operands
                    .first()
                    .and_then(|operand| operand.as_name().ok())
                {
                    current_encoding = encodings.get(font_name).copied();
                }
            }
            "Tj" | "TJ" | "'" | "\"" => {
                collect_text(&mut current, current_encoding, &operation.operands);
            }
            "T*" | "Td" | "TD" | "ET" => {
                if !current.trim().is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
            }
            _ => {}
        }
    }

    if !current.trim().is_empty() {
        lines.push(current);
    }

    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Loads the PDF and picks the most table-like text for every selected page.
pub(crate) fn read_pdf_text(
    input_pdf: &Path,
    page_selection: Option<&PageSelection>,
) -> Result<DocumentText, PipelineError> {
    let document = Document::load(input_pdf).map_err(|error| PipelineError::SourceUnreadable {
        path: input_pdf.to_path_buf(),
        reason: error.to_string(),
    })?;
    let pages_map = document.get_pages();

    let whole_text = pdf_extract::extract_text(input_pdf).ok();
    let per_page = whole_text
        .as_deref()
        .map(split_text_into_pages)
        .filter(|pages| pages.len() == pages_map.len());

    let mut pages = Vec::new();
    for (index, (page_no, page_id)) in pages_map.iter().enumerate() {
        if page_selection.is_some_and(|selection| !selection.contains(*page_no)) {
            continue;
        }

        let mut candidates = Vec::new();
        if let Some(text) = per_page
            .as_ref()
            .and_then(|texts| texts.get(index).cloned())
            .filter(|text| !text.trim().is_empty())
        {
            candidates.push(text);
        }
        if let Some(text) = extract_text_from_page_content(&document, *page_id) {
            candidates.push(text);
        }
        if let Some(text) = document
            .extract_text(&[*page_no])
            .ok()
            .filter(|text| !text.trim().is_empty())
        {
            candidates.push(text);
        }

        debug!(page = *page_no, candidates = candidates.len(), "scored page text candidates");
        pages.push(PageText {
            page_number: *page_no,
            text: choose_best_text(candidates),
        });
    }

    if pages.is_empty() {
        return Err(PipelineError::InvalidOption(format!(
            "page selection matches none of the {} pages in '{}'",
            pages_map.len(),
            input_pdf.display()
        )));
    }

    Ok(DocumentText {
        pages,
        full_text: whole_text.filter(|text| !text.trim().is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::{decode_pdf_bytes, split_text_into_pages, table_likeness_score};

    #[test]
    fn splits_form_feed_delimited_pages() {
        let pages = split_text_into_pages("p1\u{000C}p2\u{000C}");
        assert_eq!(pages, vec!["p1", "p2"]);
    }

    #[test]
    fn decodes_big5_when_encoding_hint_is_present() {
        let (bytes, _, had_errors) = encoding_rs::BIG5.encode("測試");
        assert!(!had_errors);
        let decoded = decode_pdf_bytes(Some("ETen-B5-H"), &bytes);
        assert_eq!(decoded, "測試");
    }

    #[test]
    fn tabular_text_outscores_prose() {
        let table = "Date  Amount\n2024-01-01  10.00\n2024-01-02  12.50";
        let prose = "A paragraph of text.\nAnother sentence follows here.";
        assert!(table_likeness_score(table) > table_likeness_score(prose));
    }
}
