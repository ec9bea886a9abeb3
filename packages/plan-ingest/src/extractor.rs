//! HTML → plan extraction.
//!
//! Training plans on the source site are published as loosely formatted
//! HTML tables. The extractor reads the first `<table>` of a page with
//! positional rules:
//!
//! | layout  | columns                                                          |
//! |---------|------------------------------------------------------------------|
//! | wide    | amount, multiplier, distance, break, content, intensity, sum     |
//! | compact | `"4 x 100"`, break, content, intensity, sum                      |
//!
//! A row is *structural* when at least two of amount, distance and sum parse
//! as integers. Anything else is continuation text (footnotes, wrapped
//! descriptions) and is appended to the previous row's content, unless one of
//! its cells is a total sentinel ("Gesamt", "Total: 2400m"): that row is the
//! source's own total row.
//!
//! Pages without a table are not an error: [`extract`] returns `None`.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

use crate::types::plan::{is_total_marker, Row, Table};

static TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static CELL: LazyLock<Selector> = LazyLock::new(|| selector("td, th"));
static HEADING: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| selector("p"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));

/// Leading integer with optional thousands separators and unit suffix.
static LEADING_INT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,3}(?:[.']\d{3})+|\d+)").expect("valid integer pattern")
});

/// `"4 x 100"`, `"4x100m"`, `"4 × 100 m"`.
static REPS_BY_DISTANCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s*([xX×*])\s*(\d+)").expect("valid repetition pattern")
});

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

/// Result of extracting a page that contains a table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub title: String,
    pub description: String,
    /// Normalised table: total row appended and sums recomputed when non-empty
    pub table: Table,
}

/// Everything the crawler needs from one fetched page.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// `None` when the page has no `<table>`
    pub extracted: Option<ExtractedPage>,
    /// Raw `href` values in document order
    pub hrefs: Vec<String>,
}

/// Parse a page once and pull out both the plan and the outgoing links.
pub fn parse_page(html: &str) -> ParsedPage {
    let document = Html::parse_document(html);
    ParsedPage {
        extracted: extract_document(&document),
        hrefs: extract_hrefs(&document),
    }
}

/// Extract title, description and the plan table from an HTML page.
///
/// Returns `None` when the page has no `<table>`.
pub fn extract(html: &str) -> Option<ExtractedPage> {
    extract_document(&Html::parse_document(html))
}

fn extract_document(document: &Html) -> Option<ExtractedPage> {
    let table_el = document.select(&TABLE).next()?;

    let mut table = extract_table(table_el);
    table.add_sum();
    table.update_sum();

    Some(ExtractedPage {
        title: extract_title(document).unwrap_or_default(),
        description: extract_description(document),
        table,
    })
}

fn extract_hrefs(document: &Html) -> Vec<String> {
    document
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .collect()
}

fn extract_title(document: &Html) -> Option<String> {
    document
        .select(&HEADING)
        .chain(document.select(&TITLE))
        .map(|el| element_text(&el))
        .find(|t| !t.is_empty())
}

fn extract_description(document: &Html) -> String {
    document
        .select(&PARAGRAPH)
        .filter(|p| !inside_table(p))
        .map(|p| element_text(&p))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_table(table_el: ElementRef<'_>) -> Table {
    let mut table = Table::new();

    for tr in table_el.select(&ROW) {
        let cells: Vec<String> = tr.select(&CELL).map(|c| element_text(&c)).collect();

        match classify_row(&cells) {
            RowKind::Blank => {}
            RowKind::Structural(row) | RowKind::Total(row) => table.push(row),
            RowKind::Continuation(text) => {
                // Header rows before the first exercise have nothing to continue
                table.continue_last(&text);
            }
        }
    }

    table
}

#[derive(Debug, PartialEq)]
enum RowKind {
    Blank,
    Structural(Row),
    Total(Row),
    Continuation(String),
}

fn classify_row(cells: &[String]) -> RowKind {
    let joined = cells
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        return RowKind::Blank;
    }

    let row = match cells.first().and_then(|c| REPS_BY_DISTANCE.captures(c)) {
        Some(caps) => compact_row(cells, &caps),
        None => wide_row(cells),
    };
    let marker = cells.iter().find(|c| is_total_marker(c));

    match (row, marker) {
        (_, Some(marker)) => RowKind::Total(Row::total(marker.trim())),
        (Some(row), None) => RowKind::Structural(row),
        (None, None) => RowKind::Continuation(joined),
    }
}

/// `amount | multiplier | distance | break | content | intensity | sum`
fn wide_row(cells: &[String]) -> Option<Row> {
    let cell = |i: usize| cells.get(i).map(String::as_str).unwrap_or("");

    let numbers = NumericColumns {
        amount: parse_int(cell(0)),
        distance: parse_int(cell(2)),
        sum: parse_int(cell(6)),
    };
    let (amount, distance) = numbers.resolve()?;

    Some(Row {
        amount,
        multiplier: cell(1).to_string(),
        distance,
        pause: cell(3).to_string(),
        content: cell(4).to_string(),
        intensity: cell(5).to_string(),
        sum: 0,
    })
}

/// `"4 x 100" | break | content | intensity | sum`
fn compact_row(cells: &[String], caps: &regex::Captures<'_>) -> Option<Row> {
    let cell = |i: usize| cells.get(i).map(String::as_str).unwrap_or("");

    let numbers = NumericColumns {
        amount: caps.get(1).and_then(|m| m.as_str().parse().ok()),
        distance: caps.get(3).and_then(|m| m.as_str().parse().ok()),
        sum: parse_int(cell(4)),
    };
    let (amount, distance) = numbers.resolve()?;

    Some(Row {
        amount,
        multiplier: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        distance,
        pause: cell(1).to_string(),
        content: cell(2).to_string(),
        intensity: cell(3).to_string(),
        sum: 0,
    })
}

struct NumericColumns {
    amount: Option<i32>,
    distance: Option<i32>,
    sum: Option<i32>,
}

impl NumericColumns {
    /// Apply the two-of-three rule and fill a missing factor from the sum.
    fn resolve(&self) -> Option<(i32, i32)> {
        let parsed = [self.amount, self.distance, self.sum]
            .iter()
            .filter(|n| n.is_some())
            .count();
        if parsed < 2 {
            return None;
        }

        let (amount, distance) = match (self.amount, self.distance, self.sum) {
            (Some(a), Some(d), _) => (a, d),
            (Some(a), None, Some(s)) if a != 0 => (a, s / a),
            (None, Some(d), Some(s)) if d != 0 => (s / d, d),
            (a, d, _) => (a.unwrap_or(0), d.unwrap_or(0)),
        };
        Some((amount, distance))
    }
}

/// Parse the leading integer of a cell (`"100m"` → 100, `"1.000"` → 1000).
fn parse_int(cell: &str) -> Option<i32> {
    let caps = LEADING_INT.captures(cell)?;
    let digits: String = caps[1].chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn inside_table(el: &ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(|n| n.value().as_element())
        .any(|e| e.name() == "table")
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}
