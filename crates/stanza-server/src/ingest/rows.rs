//! Row parsing
//!
//! Turns raw CSV text into typed [`RowRecord`]s. The header row defines
//! field names, blank lines are skipped, and boolean/numeric-looking cells
//! are coerced leniently. Structural problems (unbalanced quoting, ragged
//! rows) abort the whole batch before any row is processed; missing values
//! become defaults so the validator stays the single authority on what a
//! row must contain.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Batch-aborting parse failure
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("CSV text is empty or not properly loaded")]
    Empty,

    #[error("Malformed CSV: {0}")]
    Malformed(String),
}

/// One CSV data line mapped to named fields
///
/// Field names mirror the export's column headers. Unknown columns are
/// ignored; known-but-absent columns fall back to defaults and are caught
/// by validation where required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    #[serde(rename = "Body", default)]
    pub body: String,

    #[serde(rename = "Meta", default)]
    pub meta: String,

    #[serde(rename = "Title", default)]
    pub title: String,

    #[serde(rename = "Author", default)]
    pub author: String,

    #[serde(rename = "Language", default)]
    pub language: String,

    #[serde(rename = "Category", default)]
    pub category: String,

    #[serde(rename = "URL Slug", default)]
    pub slug: String,

    #[serde(rename = "Image - Assets", default)]
    pub image_url: String,

    /// Defaults to true when the cell is empty or not boolean-looking.
    #[serde(
        rename = "Risk Disclaimer",
        default = "default_flag",
        deserialize_with = "lenient_flag"
    )]
    pub risk_disclaimer: bool,

    /// Defaults to true when the cell is empty or not boolean-looking.
    #[serde(
        rename = "Blog Post Banner",
        default = "default_flag",
        deserialize_with = "lenient_flag"
    )]
    pub blog_post_banner: bool,

    #[serde(rename = "Keyword", default)]
    pub keyword: Option<String>,

    #[serde(rename = "Format", default)]
    pub format: Option<String>,

    #[serde(
        rename = "Image - Number",
        default,
        deserialize_with = "lenient_number"
    )]
    pub image_number: Option<f64>,
}

impl Default for RowRecord {
    fn default() -> Self {
        Self {
            body: String::new(),
            meta: String::new(),
            title: String::new(),
            author: String::new(),
            language: String::new(),
            category: String::new(),
            slug: String::new(),
            image_url: String::new(),
            risk_disclaimer: default_flag(),
            blog_post_banner: default_flag(),
            keyword: None,
            format: None,
            image_number: None,
        }
    }
}

fn default_flag() -> bool {
    true
}

/// A cell that may arrive as a JSON boolean/number (pre-parsed rows) or as
/// CSV text.
#[derive(Deserialize)]
#[serde(untagged)]
enum Cell {
    Bool(bool),
    Number(f64),
    Text(String),
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = match Option::<Cell>::deserialize(deserializer)? {
        None => return Ok(default_flag()),
        Some(cell) => cell,
    };

    Ok(match value {
        Cell::Bool(flag) => flag,
        Cell::Number(number) => number != 0.0,
        Cell::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => true,
            "false" | "0" | "no" | "n" => false,
            _ => default_flag(),
        },
    })
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = match Option::<Cell>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(cell) => cell,
    };

    Ok(match value {
        Cell::Bool(_) => None,
        Cell::Number(number) => Some(number),
        Cell::Text(text) => text.trim().parse().ok(),
    })
}

/// Parse raw CSV text into an ordered sequence of row records
///
/// Fails with [`ParseError`] if the text is empty or structurally
/// malformed; this aborts the entire batch before any row processing
/// begins.
pub fn parse_csv(text: &str) -> Result<Vec<RowRecord>, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for (index, result) in reader.deserialize::<RowRecord>().enumerate() {
        let record = result
            .map_err(|e| ParseError::Malformed(format!("data line {}: {}", index + 1, e)))?;
        records.push(record);
    }

    Ok(records)
}
