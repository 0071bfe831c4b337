//! Generic HTML table to header/row matrix

use crate::models::RawTable;
use scraper::{ElementRef, Html, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Head,
    Body,
}

/// Parse the first `<table>` in `fragment` into a [`RawTable`].
///
/// Rows without any `td`/`th` cell are ignored. The first remaining row
/// becomes the header row. Rows inside `<thead>` are header rows, but only
/// the first one is kept. Everything else is data. Returns `None` when there
/// is no table or it yields no cells at all.
pub fn parse_table(fragment: &str) -> Option<RawTable> {
    let document = Html::parse_fragment(fragment);
    let selector = Selector::parse("table").ok()?;
    let table = document.select(&selector).next()?;

    let mut parsed = RawTable::default();
    let mut have_header = false;

    for (section, row) in table_rows(table) {
        let cells = row_cells(row);
        if cells.is_empty() {
            continue;
        }
        if !have_header {
            parsed.headers = cells;
            have_header = true;
            continue;
        }
        if section == Section::Body {
            parsed.rows.push(cells);
        }
    }

    if parsed.is_empty() {
        None
    } else {
        Some(parsed)
    }
}

/// Rows owned directly by `table`, in document order, excluding nested tables
fn table_rows(table: ElementRef<'_>) -> Vec<(Section, ElementRef<'_>)> {
    let mut rows = Vec::new();

    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push((Section::Body, child)),
            name @ ("thead" | "tbody" | "tfoot") => {
                let section = if name == "thead" {
                    Section::Head
                } else {
                    Section::Body
                };
                rows.extend(
                    child
                        .children()
                        .filter_map(ElementRef::wrap)
                        .filter(|el| el.value().name() == "tr")
                        .map(|tr| (section, tr)),
                );
            }
            _ => {}
        }
    }

    rows
}

fn row_cells(row: ElementRef<'_>) -> Vec<String> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "td" | "th"))
        .map(cell_text)
        .collect()
}

/// Concatenate every descendant text node, each trimmed
pub fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().map(str::trim).collect::<String>()
}
