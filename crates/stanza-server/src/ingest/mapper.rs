//! Row-to-document mapping
//!
//! Assembles a [`PostDocument`] from a validated row: body HTML becomes
//! portable-text blocks, reference names resolve to ids, the cover image
//! is uploaded, and only a fully-resolved document is submitted to the
//! store. Any failure discards the row with a single error, so no partial
//! post ever reaches the dataset.

use std::sync::Arc;

use chrono::Utc;

use super::blocks::html_to_blocks;
use super::resolve::{BatchCaches, ReferenceKind, Resolver};
use super::rows::RowRecord;
use super::upload::ImageUploader;
use super::IngestError;
use crate::cms::{CmsClient, ImageRef, PostDocument, Slug};

/// Message recorded when the store rejects a finished document.
pub const PERSIST_FAILED_MESSAGE: &str = "Something went wrong while adding post";

/// Shared machinery for mapping rows across batches
///
/// One context lives in the worker for the process lifetime; per-batch
/// state (dataset, caches) arrives with each job.
pub struct MapperContext {
    cms: Arc<CmsClient>,
    uploader: ImageUploader,
}

impl MapperContext {
    pub fn new(cms: Arc<CmsClient>, uploader: ImageUploader) -> Self {
        Self { cms, uploader }
    }

    /// Map one row and persist the resulting document, returning its id
    #[tracing::instrument(skip(self, row, caches), fields(slug = %row.slug))]
    pub async fn process_row(
        &self,
        row: &RowRecord,
        dataset: &str,
        caches: &BatchCaches,
    ) -> Result<String, IngestError> {
        let document = self.map_row(row, dataset, caches).await?;

        let id = self
            .cms
            .create(dataset, &document)
            .await
            .map_err(|cause| {
                tracing::warn!(slug = %row.slug, error = %cause, "Post creation failed");
                IngestError::Persistence(PERSIST_FAILED_MESSAGE.to_string())
            })?;

        tracing::info!(slug = %row.slug, id = %id, "Post created");
        Ok(id)
    }

    /// Build the document for one row without submitting it
    pub async fn map_row(
        &self,
        row: &RowRecord,
        dataset: &str,
        caches: &BatchCaches,
    ) -> Result<PostDocument, IngestError> {
        let content = html_to_blocks(&row.body);

        let resolver = Resolver::new(&self.cms, dataset, caches);
        let author = resolver.resolve(ReferenceKind::Author, &row.author).await?;
        let category = resolver
            .resolve(ReferenceKind::Category, &row.category)
            .await?;
        let language = resolver
            .resolve(ReferenceKind::Language, &row.language)
            .await?;

        let asset_id = self
            .uploader
            .upload(&self.cms, dataset, caches, &row.image_url)
            .await?;

        Ok(PostDocument {
            doc_type: "post".to_string(),
            title: row.title.clone(),
            slug: Slug::new(&row.slug),
            description: row.meta.clone(),
            date: Utc::now(),
            risk_disclaimer: row.risk_disclaimer,
            blog_post_banner: row.blog_post_banner,
            content,
            author,
            category,
            language,
            cover_image: ImageRef::to_asset(asset_id),
        })
    }
}
