use std::mem::take;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::TableLayout;

/// Cell texts of one table row, in column order.
pub type RawRow = Vec<String>;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid row selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
}

static SEL_BOLD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("b").expect("invalid selector: b"));

/// Extracts raw rows from a fetched document according to `layout`.
pub fn parse_rows(text: &str, layout: &TableLayout) -> Result<Vec<RawRow>, ParseError> {
    match layout {
        TableLayout::Html {
            row_selector,
            skip_bold_rows,
        } => parse_html_rows(text, row_selector, *skip_bold_rows),
        TableLayout::Csv {
            delimiter,
            has_header,
        } => Ok(parse_csv_rows(text, *delimiter, *has_header)),
    }
}

pub fn parse_html_rows(
    html: &str,
    row_selector: &str,
    skip_bold_rows: bool,
) -> Result<Vec<RawRow>, ParseError> {
    let selector = Selector::parse(row_selector).map_err(|e| ParseError::InvalidSelector {
        selector: row_selector.to_string(),
        reason: e.to_string(),
    })?;
    let document = Html::parse_document(html);

    let mut rows = Vec::new();

    for row in document.select(&selector) {
        let cells: Vec<ElementRef> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "td" | "th"))
            .collect();

        // Header rows carry only <th> cells.
        if !cells.iter().any(|c| c.value().name() == "td") {
            continue;
        }

        if skip_bold_rows && is_bold_data_cell(cells[0]) {
            log::debug!("Skipping totals row: {}", cell_text(cells[0]));
            continue;
        }

        rows.push(cells.into_iter().map(cell_text).collect());
    }

    log::debug!("Extracted {} row(s) with '{}'", rows.len(), row_selector);
    Ok(rows)
}

fn is_bold_data_cell(cell: ElementRef) -> bool {
    cell.value().name() == "td" && cell.select(&SEL_BOLD).next().is_some()
}

/// Visible text of a cell with footnote markers (`<sup>`) removed.
fn cell_text(cell: ElementRef) -> String {
    let mut out = String::new();
    collect_text(cell, &mut out);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(el) = ElementRef::wrap(child) {
            match el.value().name() {
                "sup" | "style" | "script" => {}
                "br" => out.push(' '),
                _ => collect_text(el, out),
            }
        }
    }
}

/// Quote-aware CSV reader. Blank lines are dropped; an unterminated quote runs to end of input.
pub fn parse_csv_rows(text: &str, delimiter: char, has_header: bool) -> Vec<RawRow> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            c if c == delimiter && !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(take(&mut field));
                push_row(&mut rows, take(&mut row));
            }
            _ => field.push(ch),
        }
    }

    row.push(field);
    push_row(&mut rows, row);

    if has_header && !rows.is_empty() {
        rows.remove(0);
    }

    rows
}

fn push_row(rows: &mut Vec<RawRow>, row: RawRow) {
    if row.iter().any(|cell| !cell.trim().is_empty()) {
        rows.push(row.into_iter().map(|c| c.trim().to_string()).collect());
    }
}
