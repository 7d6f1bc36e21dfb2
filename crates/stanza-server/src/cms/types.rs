//! Document payload types for the content store
//!
//! Field names serialize to the store's wire conventions (`_type`, `_ref`,
//! camelCase field names), matching the post schema defined in the studio.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::blocks::Block;

/// A pointer to another entity by stable identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "_ref")]
    pub reference: String,
    #[serde(rename = "_type")]
    pub kind: String,
}

impl Reference {
    pub fn to_entity(id: impl Into<String>) -> Self {
        Self {
            reference: id.into(),
            kind: "reference".to_string(),
        }
    }
}

/// URL slug wrapper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slug {
    pub current: String,
    #[serde(rename = "_type")]
    pub kind: String,
}

impl Slug {
    pub fn new(current: impl Into<String>) -> Self {
        Self {
            current: current.into(),
            kind: "slug".to_string(),
        }
    }
}

/// An image field pointing at an uploaded asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(rename = "_type")]
    pub kind: String,
    pub asset: Reference,
}

impl ImageRef {
    pub fn to_asset(asset_id: impl Into<String>) -> Self {
        Self {
            kind: "image".to_string(),
            asset: Reference::to_entity(asset_id),
        }
    }
}

/// A fully-resolved post document, ready for persistence
///
/// Never submitted unless every required field is present and every
/// reference resolved; a partially-mapped row is discarded with an error
/// record instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDocument {
    #[serde(rename = "_type")]
    pub doc_type: String,
    pub title: String,
    pub slug: Slug,
    pub description: String,
    /// Processing time, never a CSV-supplied date.
    pub date: DateTime<Utc>,
    #[serde(rename = "riskDisclaimer")]
    pub risk_disclaimer: bool,
    #[serde(rename = "blogPostBanner")]
    pub blog_post_banner: bool,
    pub content: Vec<Block>,
    pub author: Reference,
    pub category: Reference,
    pub language: Reference,
    #[serde(rename = "coverImage")]
    pub cover_image: ImageRef,
}
