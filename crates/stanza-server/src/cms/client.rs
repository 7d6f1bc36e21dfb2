//! HTTP client for the content store data API

use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::CmsConfig;

/// Request timeout for query/mutate calls. Asset source fetches have their
/// own, longer bound in the uploader.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors from content store calls
#[derive(Debug, Error)]
pub enum CmsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Content store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed content store response: {0}")]
    Malformed(String),
}

/// Client for the content store's HTTP data API
///
/// One instance serves all datasets; the dataset is part of each call so a
/// batch can target the dataset named in its request.
#[derive(Debug, Clone)]
pub struct CmsClient {
    http: Client,
    base_url: String,
    api_version: String,
    token: Option<String>,
}

impl CmsClient {
    /// Create a new client from configuration
    pub fn new(config: &CmsConfig) -> Result<Self, CmsError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("stanza-server/0.1")
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v{}/{}", self.base_url, self.api_version, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<Value, CmsError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CmsError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// Run a filter query and return the first match, if any
    ///
    /// `params` are bound as `$name` query parameters with JSON-encoded
    /// values, so the filter itself never interpolates user input.
    pub async fn fetch_first(
        &self,
        dataset: &str,
        query: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<Value>, CmsError> {
        let mut request = self
            .http
            .get(self.url(&format!("data/query/{dataset}")))
            .query(&[("query", query)]);

        for (name, value) in params {
            request = request.query(&[(format!("${name}"), Value::String((*value).to_string()).to_string())]);
        }

        let body = Self::check(self.authorize(request).send().await?).await?;

        match body.get("result") {
            None | Some(Value::Null) => Ok(None),
            Some(result) => Ok(Some(result.clone())),
        }
    }

    /// Create a document, returning its assigned id
    pub async fn create<T: Serialize>(&self, dataset: &str, document: &T) -> Result<String, CmsError> {
        let request = self
            .http
            .post(self.url(&format!("data/mutate/{dataset}")))
            .query(&[("returnIds", "true")])
            .json(&json!({ "mutations": [{ "create": document }] }));

        let body = Self::check(self.authorize(request).send().await?).await?;

        body.get("results")
            .and_then(|results| results.get(0))
            .and_then(|result| result.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CmsError::Malformed("mutate response missing created id".to_string()))
    }

    /// Delete a document by id
    pub async fn delete(&self, dataset: &str, id: &str) -> Result<(), CmsError> {
        let request = self
            .http
            .post(self.url(&format!("data/mutate/{dataset}")))
            .json(&json!({ "mutations": [{ "delete": { "id": id } }] }));

        Self::check(self.authorize(request).send().await?).await?;
        Ok(())
    }

    /// Upload image bytes as a new asset, returning the asset id
    pub async fn upload_image(&self, dataset: &str, bytes: Vec<u8>) -> Result<String, CmsError> {
        let request = self
            .http
            .post(self.url(&format!("assets/images/{dataset}")))
            .header("content-type", "application/octet-stream")
            .body(bytes);

        let body = Self::check(self.authorize(request).send().await?).await?;

        body.get("document")
            .and_then(|document| document.get("_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CmsError::Malformed("asset response missing document id".to_string()))
    }
}
