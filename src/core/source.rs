use async_trait::async_trait;
use serde_json::Value;

use crate::error::FetchError;

/// Where job status payloads come from.
///
/// Implementations return the raw JSON object for the job. Normalization
/// happens in the poller, so a source only has to reject transport errors,
/// non-2xx responses and bodies that are not JSON objects.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: &str) -> Result<Value, FetchError>;
}
