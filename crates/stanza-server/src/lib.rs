//! Stanza Server Library
//!
//! HTTP service for bulk-importing blog posts into a hosted Sanity content
//! store from CSV exports.
//!
//! # Overview
//!
//! One `POST /add-posts` request carries a batch of rows (pre-parsed, or as
//! raw CSV text) plus a target dataset. The service validates each row,
//! enqueues accepted rows as asynchronous jobs, and acknowledges the batch.
//! A background worker then resolves author/category/language references,
//! uploads the cover image, converts the body markup into portable-text
//! blocks, and creates the post document in the content store. Per-row
//! failures accumulate into a CSV report that is mailed once the batch has
//! been dispatched.
//!
//! # Architecture
//!
//! - **api**: axum routes and the HTTP contract
//! - **cms**: thin client for the content store's HTTP data API
//! - **ingest**: the pipeline — row parsing, validation, reference
//!   resolution, asset upload, document mapping, the job queue/worker, and
//!   the report mailer
//!
//! The batch is accepted once rows are validated and enqueued; document
//! creation is at-least-once under job retry and completes after the HTTP
//! response.
//!
//! # Example
//!
//! ```no_run
//! use stanza_server::{api, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     api::serve(config).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cms;
pub mod config;
pub mod error;
pub mod ingest;

// Re-export commonly used types
pub use error::{AppError, AppResult};
