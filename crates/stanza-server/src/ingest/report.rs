//! Batch error reporting
//!
//! After dispatch, a plain-text summary goes out over a SendGrid-compatible
//! mail API, with the per-row errors attached as a CSV file when any row
//! failed. Reporting is strictly best-effort: a missing key, empty
//! recipient list, or mail API failure is logged and never fails the
//! batch.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde_json::json;

use super::ErrorRecord;
use crate::config::ReportConfig;

const SUBJECT: &str = "Add Posts via CSV Report";
const ATTACHMENT_NAME: &str = "Add-Posts-Report.csv";
const SEND_TIMEOUT_SECS: u64 = 30;

/// Render error records as CSV text, header row included
pub fn errors_to_csv(errors: &[ErrorRecord]) -> Result<String, anyhow::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in errors {
        writer.serialize(record)?;
    }
    let bytes = writer.into_inner()?;
    Ok(String::from_utf8(bytes)?)
}

/// Sends the post-batch report email
pub struct ReportMailer {
    http: Client,
    config: ReportConfig,
}

impl ReportMailer {
    pub fn new(config: ReportConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, config })
    }

    /// Send the report for one finished batch
    ///
    /// `total` is the number of rows dispatched; `errors` the rows that
    /// were rejected. Never returns an error: every failure path here is
    /// logged and swallowed.
    pub async fn send_report(&self, total: usize, errors: &[ErrorRecord]) {
        let api_key = match self.config.api_key.as_deref() {
            Some(key) if !self.config.to.is_empty() => key,
            _ => {
                tracing::info!(
                    total,
                    failed = errors.len(),
                    "Report skipped: mail API key or recipients not configured"
                );
                return;
            },
        };

        let payload = match self.build_payload(total, errors) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(error = %error, "Failed to render report attachment");
                return;
            },
        };

        let url = format!(
            "{}/v3/mail/send",
            self.config.api_base_url.trim_end_matches('/')
        );
        let outcome = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match outcome {
            Ok(_) => tracing::info!(total, failed = errors.len(), "Report sent"),
            Err(error) => tracing::error!(error = %error, "Failed to send report"),
        }
    }

    fn build_payload(
        &self,
        total: usize,
        errors: &[ErrorRecord],
    ) -> Result<serde_json::Value, anyhow::Error> {
        let to: Vec<serde_json::Value> = self
            .config
            .to
            .iter()
            .map(|email| json!({ "email": email }))
            .collect();

        let body = if errors.is_empty() {
            format!("All {total} posts were added successfully.")
        } else {
            format!(
                "{} of {total} posts failed. Details are attached as {ATTACHMENT_NAME}.",
                errors.len()
            )
        };

        let mut payload = json!({
            "personalizations": [{ "to": to }],
            "from": {
                "email": self.config.from_email,
                "name": self.config.from_name,
            },
            "subject": SUBJECT,
            "content": [{ "type": "text/plain", "value": body }],
        });

        if !errors.is_empty() {
            let csv_text = errors_to_csv(errors)?;
            payload["attachments"] = json!([{
                "content": BASE64.encode(csv_text),
                "filename": ATTACHMENT_NAME,
                "type": "text/csv",
                "disposition": "attachment",
            }]);
        }

        Ok(payload)
    }
}
