//! Plan types - exercise rows, tables and plans.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use uuid::Uuid;

/// Content marker written into a synthetic total row.
pub const TOTAL_MARKER: &str = "Gesamt";

/// A whole-word sentinel, optionally followed by a distance:
/// `"Gesamt"`, `"Total:"`, `"gesamt 2.400 m"`, `"Gesamtsumme = 3400m"`.
static TOTAL_CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:gesamt(?:summe|strecke)?|total)\b[\s:=.\-]*(?:\d[\d.']*\s*(?:m|km|meter)?\.?)?\s*$")
        .expect("valid total pattern")
});

/// Whether `text` is a total sentinel cell.
///
/// Exercise text that merely starts with the word ("Total Immersion",
/// "Gesamtkörperspannung") is not a marker.
pub fn is_total_marker(text: &str) -> bool {
    TOTAL_CELL.is_match(text)
}

/// One exercise line of a training plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Number of repetitions
    pub amount: i32,

    /// Multiplier marker as written in the source ("x", "×", ...)
    pub multiplier: String,

    /// Distance per repetition in meters
    pub distance: i32,

    /// Rest between repetitions, free form ("20s", "P: 1'", "nach Zeit")
    #[serde(rename = "break")]
    pub pause: String,

    /// Exercise description
    pub content: String,

    /// Intensity zone ("GA1", "locker", ...)
    pub intensity: String,

    /// `amount * distance`, or the running total for the total row
    pub sum: i32,
}

impl Row {
    /// Create an exercise row. The sum is filled in by [`Table::update_sum`].
    pub fn new(amount: i32, distance: i32, content: impl Into<String>) -> Self {
        Self {
            amount,
            multiplier: "x".to_string(),
            distance,
            content: content.into(),
            ..Default::default()
        }
    }

    /// Create a total row carrying the given marker as content.
    pub fn total(marker: impl Into<String>) -> Self {
        Self {
            content: marker.into(),
            ..Default::default()
        }
    }

    /// Set the rest column.
    pub fn with_pause(mut self, pause: impl Into<String>) -> Self {
        self.pause = pause.into();
        self
    }

    /// Set the intensity column.
    pub fn with_intensity(mut self, intensity: impl Into<String>) -> Self {
        self.intensity = intensity.into();
        self
    }

    /// Whether this row is a total row.
    pub fn is_total(&self) -> bool {
        is_total_marker(&self.content)
    }

    /// Append continuation text to the content column.
    pub fn append_content(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.content.is_empty() {
            self.content.push(' ');
        }
        self.content.push_str(text);
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_total() {
            return write!(f, "{}: {}m", self.content, self.sum);
        }
        write!(
            f,
            "{} {} {}m | {} | {} | {} | {}",
            self.amount, self.multiplier, self.distance, self.pause, self.content, self.intensity, self.sum
        )
    }
}

/// Ordered exercise rows of one plan.
///
/// Rows are appended in document order during extraction. [`Table::add_sum`]
/// and [`Table::update_sum`] then normalise the table so that exactly one
/// total row closes it and every sum is consistent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row.
    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Append continuation text to the last row.
    ///
    /// Returns `false` when there is no row to continue.
    pub fn continue_last(&mut self, text: &str) -> bool {
        match self.rows.last_mut() {
            Some(row) => {
                row.append_content(text);
                true
            }
            None => false,
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// A table is empty when it holds no exercise rows.
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Row::is_total)
    }

    /// The total row, if present.
    pub fn total(&self) -> Option<&Row> {
        self.rows.iter().rev().find(|r| r.is_total())
    }

    /// Ensure exactly one total row closes the table.
    ///
    /// An existing total row keeps its marker text but is moved to the end;
    /// duplicates are dropped. Tables without exercise rows get no total.
    pub fn add_sum(&mut self) {
        let marker = self.total().map(|r| r.content.clone());
        self.rows.retain(|r| !r.is_total());
        if self.rows.is_empty() {
            return;
        }
        self.rows
            .push(Row::total(marker.unwrap_or_else(|| TOTAL_MARKER.to_string())));
    }

    /// Recompute every sum in one pass.
    ///
    /// Exercise rows get `amount * distance`; a total row gets the running sum
    /// of the rows before it and does not contribute to the running sum itself.
    pub fn update_sum(&mut self) {
        let mut running: i32 = 0;
        for row in &mut self.rows {
            if row.is_total() {
                row.sum = running;
            } else {
                row.sum = row.amount.saturating_mul(row.distance);
                running = running.saturating_add(row.sum);
            }
        }
    }

    /// Total distance in meters (0 when no total row exists).
    pub fn total_distance(&self) -> i32 {
        self.total().map(|r| r.sum).unwrap_or(0)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            writeln!(f, "{}", row)?;
        }
        Ok(())
    }
}

/// Deterministic plan id for a source URL.
pub fn plan_id(url: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes())
}

/// A training plan scraped from one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Derived from `url`, see [`plan_id`]
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub description: String,
    pub table: Table,
}

impl Plan {
    /// Create a plan; the id is derived from the URL.
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        table: Table,
    ) -> Self {
        let url = url.into();
        Self {
            id: plan_id(&url),
            url,
            title: title.into(),
            description: description.into(),
            table,
        }
    }

    /// Text that represents this plan for embedding and classification.
    pub fn text(&self) -> String {
        format!("{}\n{}\n{}", self.title, self.description, self.table)
    }
}
