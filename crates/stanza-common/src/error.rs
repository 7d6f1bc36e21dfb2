//! Error types for Stanza

use thiserror::Error;

/// Result type alias for Stanza operations
pub type Result<T> = std::result::Result<T, StanzaError>;

/// Main error type for Stanza
#[derive(Error, Debug)]
pub enum StanzaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("CSV parse error: {0}")]
    Parse(String),

    #[error("Content store error: {0}")]
    ContentStore(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
