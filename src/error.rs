use thiserror::Error;

/// A status fetch that did not produce a usable payload.
///
/// Always treated as transient: the poller logs it and tries again on the
/// next tick.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("status endpoint returned HTTP {status} for job {job_id}")]
    Status { job_id: String, status: u16 },
    #[error("malformed status payload for job {job_id}: {reason}")]
    Malformed { job_id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackError {
    #[error("job id must not be empty")]
    EmptyJobId,
}
