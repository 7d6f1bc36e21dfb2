//! Batch ingestion pipeline
//!
//! Control flow for one batch: rows are parsed ([`rows`]), validated
//! ([`validate`]) and enqueued in CSV order by the orchestrator
//! ([`orchestrator`]); the worker ([`queue`]) then resolves references
//! ([`resolve`]), uploads the cover image ([`upload`]), maps the row into a
//! post document ([`mapper`], [`blocks`]) and persists it. Per-row failures
//! become [`ErrorRecord`]s and are mailed as a CSV report ([`report`]) once
//! the batch is dispatched.

pub mod blocks;
pub mod mapper;
pub mod orchestrator;
pub mod queue;
pub mod report;
pub mod resolve;
pub mod rows;
pub mod upload;
pub mod validate;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-row pipeline failure
///
/// None of these abort a batch; each is converted into an [`ErrorRecord`]
/// and the batch moves on to the next row.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Row failed schema validation (first violation only)
    #[error("{0}")]
    Validation(String),

    /// Author, category or language lookup missed
    #[error("{0}")]
    Reference(String),

    /// Image fetch or asset registration failed
    #[error("{0}")]
    Upload(String),

    /// Document-store write failed
    #[error("{0}")]
    Persistence(String),

    /// The enqueue call itself failed (infrastructure, not data)
    #[error("{0}")]
    Queue(String),
}

impl IngestError {
    /// Human-readable description as it appears in the batch report, with
    /// the failure phase prefixed where the report needs to disambiguate.
    pub fn description(&self) -> String {
        match self {
            IngestError::Validation(message) => format!("Validation Error - {message}"),
            IngestError::Queue(message) => format!("Queue Error - {message}"),
            IngestError::Reference(message)
            | IngestError::Upload(message)
            | IngestError::Persistence(message) => {
                if message.is_empty() {
                    "Something went wrong while adding post".to_string()
                } else {
                    message.clone()
                }
            },
        }
    }
}

/// One failed row, keyed by its slug
///
/// Serialized into the CSV attachment of the batch report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub slug: String,
    #[serde(rename = "errorDescription")]
    pub error_description: String,
}

impl ErrorRecord {
    pub fn new(slug: impl Into<String>, error: &IngestError) -> Self {
        Self {
            slug: slug.into(),
            error_description: error.description(),
        }
    }
}
