//! Picking the statistics table that is actually shown.
//!
//! The detail page keeps every category table in the DOM and toggles
//! visibility when a tab is clicked. After a click we take a snapshot of
//! all tables (`TableCandidate`) and run the strategies below in order;
//! the first strategy that accepts any candidate wins, and within a
//! strategy the first candidate in document order wins.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// In-page script returning one candidate per `<table>`, document order
pub const TABLE_PROBE_SCRIPT: &str = r#"(() => Array.from(document.querySelectorAll('table')).map((t, i) => {
    const style = window.getComputedStyle(t);
    return {
        index: i,
        offsetVisible: t.offsetParent !== null,
        display: style.display,
        visibility: style.visibility,
        rowCount: t.rows.length,
        html: t.outerHTML
    };
}))()"#;

/// Snapshot of one table's visibility signals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCandidate {
    pub index: usize,
    pub offset_visible: bool,
    pub display: String,
    pub visibility: String,
    pub row_count: usize,
    pub html: String,
}

impl TableCandidate {
    fn styled_visible(&self) -> bool {
        self.display != "none" && self.visibility != "hidden"
    }
}

/// Fallback chain for deciding which table is visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityStrategy {
    /// Laid out (`offsetParent` set), styled visible, has rows
    ByOffsetVisibility,
    /// Styled visible and has rows
    ByComputedStyle,
    /// Any table with a row
    FirstWithRows,
}

impl VisibilityStrategy {
    pub const ORDER: [VisibilityStrategy; 3] = [
        VisibilityStrategy::ByOffsetVisibility,
        VisibilityStrategy::ByComputedStyle,
        VisibilityStrategy::FirstWithRows,
    ];

    pub fn accepts(&self, candidate: &TableCandidate) -> bool {
        if candidate.row_count == 0 {
            return false;
        }
        match self {
            VisibilityStrategy::ByOffsetVisibility => {
                candidate.offset_visible && candidate.styled_visible()
            }
            VisibilityStrategy::ByComputedStyle => candidate.styled_visible(),
            VisibilityStrategy::FirstWithRows => true,
        }
    }

    pub fn find<'a>(&self, candidates: &'a [TableCandidate]) -> Option<&'a TableCandidate> {
        candidates.iter().find(|c| self.accepts(c))
    }
}

/// Winning candidate and the strategy that found it
#[derive(Debug, Clone, Copy)]
pub struct TableSelection<'a> {
    pub strategy: VisibilityStrategy,
    pub candidate: &'a TableCandidate,
}

pub fn select_visible_table(candidates: &[TableCandidate]) -> Option<TableSelection<'_>> {
    VisibilityStrategy::ORDER.iter().find_map(|strategy| {
        strategy.find(candidates).map(|candidate| TableSelection {
            strategy: *strategy,
            candidate,
        })
    })
}

/// Build candidates from static HTML.
///
/// Only inline `style` attributes and the `hidden` attribute are honoured:
/// `display` is the table's own value, `visibility` inherits from the
/// nearest ancestor that sets it, and a table is laid out unless it or an
/// ancestor is `display: none` or `hidden`.
pub fn probe_tables(html: &str) -> Vec<TableCandidate> {
    let document = Html::parse_document(html);
    let Ok(tables) = Selector::parse("table") else {
        return Vec::new();
    };
    let Ok(rows) = Selector::parse("tr") else {
        return Vec::new();
    };

    document
        .select(&tables)
        .enumerate()
        .map(|(index, table)| {
            let row_count = table
                .select(&rows)
                .filter(|row| owning_table(*row).is_some_and(|t| t.id() == table.id()))
                .count();

            let display = if is_hidden(table) {
                "none".to_string()
            } else {
                style_property(table, "display").unwrap_or_else(|| "table".to_string())
            };

            let visibility = std::iter::once(table)
                .chain(table.ancestors().filter_map(ElementRef::wrap))
                .find_map(|el| style_property(el, "visibility"))
                .unwrap_or_else(|| "visible".to_string());

            let offset_visible = !std::iter::once(table)
                .chain(table.ancestors().filter_map(ElementRef::wrap))
                .any(|el| is_hidden(el) || style_property(el, "display").as_deref() == Some("none"));

            TableCandidate {
                index,
                offset_visible,
                display,
                visibility,
                row_count,
                html: table.html(),
            }
        })
        .collect()
}

fn owning_table(row: ElementRef<'_>) -> Option<ElementRef<'_>> {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")
}

fn is_hidden(el: ElementRef<'_>) -> bool {
    el.value().attr("hidden").is_some()
}

fn style_property(el: ElementRef<'_>, property: &str) -> Option<String> {
    let style = el.value().attr("style")?;
    let re = Regex::new(&format!(r"(?i)(?:^|;)\s*{}\s*:\s*([a-z-]+)", property)).ok()?;
    re.captures(style)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}
