//! Configuration management

use serde::{Deserialize, Serialize};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default content store API version (date-pinned).
pub const DEFAULT_CMS_API_VERSION: &str = "2022-03-13";

/// Default dataset when a request does not name one.
pub const DEFAULT_CMS_DATASET: &str = "production";

/// Default number of attempts per document-creation job.
pub const DEFAULT_JOB_ATTEMPTS: u32 = 3;

/// Default initial retry backoff in milliseconds (doubles per attempt).
pub const DEFAULT_JOB_BACKOFF_MS: u64 = 5_000;

/// Default delay between rows during batch dispatch, in milliseconds.
/// Bounds the query load on the content store while a batch is running.
pub const DEFAULT_ROW_DELAY_MS: u64 = 5_000;

/// Default timeout for fetching a cover image from its source URL.
pub const DEFAULT_IMAGE_FETCH_TIMEOUT_SECS: u64 = 60;

/// Default mail API endpoint for the batch report.
pub const DEFAULT_REPORT_API_BASE_URL: &str = "https://api.sendgrid.com";

/// Maximum request body size for batch uploads (20 MB).
pub const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cms: CmsConfig,
    pub ingest: IngestConfig,
    pub report: ReportConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Content store (Sanity) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsConfig {
    /// Base URL of the content store API, e.g.
    /// `https://<project-id>.api.sanity.io`. Tests point this at a local
    /// mock server.
    pub base_url: String,
    /// Write token; requests go unauthenticated when absent.
    pub token: Option<String>,
    /// Date-pinned API version.
    pub api_version: String,
    /// Fallback dataset.
    pub dataset: String,
}

/// Batch ingestion knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Attempts per job before it is marked failed.
    pub job_attempts: u32,
    /// Initial retry backoff in milliseconds; doubles per attempt.
    pub job_backoff_ms: u64,
    /// Delay between rows during dispatch, in milliseconds.
    pub row_delay_ms: u64,
    /// Timeout for fetching image bytes from a source URL.
    pub image_fetch_timeout_secs: u64,
}

/// Batch report mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Base URL of the mail API (SendGrid-compatible).
    pub api_base_url: String,
    /// Mail API key; reporting is skipped when absent.
    pub api_key: Option<String>,
    /// Recipients. Empty list skips reporting.
    pub to: Vec<String>,
    pub from_email: String,
    pub from_name: String,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("STANZA_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: std::env::var("STANZA_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: std::env::var("STANZA_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            cms: CmsConfig {
                base_url: std::env::var("SANITY_BASE_URL").unwrap_or_else(|_| {
                    let project = std::env::var("SANITY_PROJECT_ID")
                        .unwrap_or_else(|_| "unset".to_string());
                    format!("https://{project}.api.sanity.io")
                }),
                token: std::env::var("SANITY_API_WRITE_TOKEN").ok(),
                api_version: std::env::var("SANITY_API_VERSION")
                    .unwrap_or_else(|_| DEFAULT_CMS_API_VERSION.to_string()),
                dataset: std::env::var("SANITY_DATASET")
                    .unwrap_or_else(|_| DEFAULT_CMS_DATASET.to_string()),
            },
            ingest: IngestConfig {
                job_attempts: std::env::var("INGEST_JOB_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_JOB_ATTEMPTS),
                job_backoff_ms: std::env::var("INGEST_JOB_BACKOFF_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_JOB_BACKOFF_MS),
                row_delay_ms: std::env::var("INGEST_ROW_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_ROW_DELAY_MS),
                image_fetch_timeout_secs: std::env::var("INGEST_IMAGE_FETCH_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_IMAGE_FETCH_TIMEOUT_SECS),
            },
            report: ReportConfig {
                api_base_url: std::env::var("REPORT_API_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_REPORT_API_BASE_URL.to_string()),
                api_key: std::env::var("REPORT_API_KEY").ok(),
                to: std::env::var("REPORT_TO_EMAILS")
                    .ok()
                    .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
                    .unwrap_or_default(),
                from_email: std::env::var("REPORT_FROM_EMAIL")
                    .unwrap_or_else(|_| "noreply@example.com".to_string()),
                from_name: std::env::var("REPORT_FROM_NAME")
                    .unwrap_or_else(|_| "Stanza".to_string()),
            },
        };

        Ok(config)
    }
}
