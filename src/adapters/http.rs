use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use crate::core::StatusSource;
use crate::error::FetchError;

/// Client for the ETL backend's `GET {base}/status/{jobId}` endpoint.
pub struct HttpStatusClient {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpStatusClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid API base URL {}", base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("API base URL {} cannot carry a path", base_url);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { base_url, client })
    }

    /// The job id is appended as a single percent-encoded path segment.
    pub fn status_url(&self, job_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("status").push(job_id);
        }
        url
    }
}

#[async_trait]
impl StatusSource for HttpStatusClient {
    async fn fetch_status(&self, job_id: &str) -> Result<Value, FetchError> {
        let url = self.status_url(job_id);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                job_id: job_id.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let payload: Value = serde_json::from_str(&body).map_err(|e| FetchError::Malformed {
            job_id: job_id.to_string(),
            reason: e.to_string(),
        })?;

        if !payload.is_object() {
            return Err(FetchError::Malformed {
                job_id: job_id.to_string(),
                reason: "expected a JSON object".to_string(),
            });
        }

        Ok(payload)
    }
}
