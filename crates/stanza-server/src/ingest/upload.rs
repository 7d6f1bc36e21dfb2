//! Cover image upload
//!
//! Fetches image bytes from the row's source URL and registers them as an
//! asset in the content store. Repeated URLs within a batch upload once;
//! every row sharing the URL reuses the cached asset id. Whatever goes
//! wrong underneath, the row only ever sees one generic upload message.

use std::time::Duration;

use reqwest::Client;

use super::resolve::BatchCaches;
use super::IngestError;
use crate::cms::CmsClient;

/// The single message every upload failure collapses to.
pub const UPLOAD_FAILED_MESSAGE: &str = "Something went wrong while uploading image to Sanity";

/// Fetches source images and registers them as content store assets
#[derive(Debug, Clone)]
pub struct ImageUploader {
    http: Client,
}

impl ImageUploader {
    /// Create an uploader whose source fetches are bounded by `timeout_secs`
    /// so a dead URL can never hang the worker.
    pub fn new(timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("stanza-server/0.1")
            .build()?;
        Ok(Self { http })
    }

    /// Upload the image at `image_url`, returning its asset id
    pub async fn upload(
        &self,
        cms: &CmsClient,
        dataset: &str,
        caches: &BatchCaches,
        image_url: &str,
    ) -> Result<String, IngestError> {
        if let Some(id) = caches.asset_id(image_url) {
            tracing::debug!(url = %image_url, id = %id, "Image cache hit");
            return Ok(id);
        }

        let id = self
            .fetch_and_register(cms, dataset, image_url)
            .await
            .map_err(|cause| {
                tracing::warn!(url = %image_url, error = %cause, "Image upload failed");
                IngestError::Upload(UPLOAD_FAILED_MESSAGE.to_string())
            })?;

        caches.record_asset(image_url, &id);
        tracing::debug!(url = %image_url, id = %id, "Image uploaded");

        Ok(id)
    }

    async fn fetch_and_register(
        &self,
        cms: &CmsClient,
        dataset: &str,
        image_url: &str,
    ) -> Result<String, anyhow::Error> {
        let response = self
            .http
            .get(image_url)
            .send()
            .await?
            .error_for_status()?;

        let bytes = response.bytes().await?.to_vec();
        let id = cms.upload_image(dataset, bytes).await?;

        Ok(id)
    }
}
