//! Content store integration
//!
//! The content store (Sanity) is consumed purely as a keyed document store
//! with a query-by-filter capability over its HTTP data API. This module
//! owns the client and the document payload types; it implements nothing of
//! the store itself.

pub mod client;
pub mod types;

pub use client::{CmsClient, CmsError};
pub use types::{ImageRef, PostDocument, Reference, Slug};
