use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::lenient;

/// Lifecycle status reported by the ETL backend for a job or one of its steps.
///
/// Anything the backend sends outside the known set maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JobStatus {
    Starting,
    Started,
    Running,
    Completed,
    Failed,
    Stopped,
    #[default]
    Unknown,
}

impl JobStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "STARTING" => Self::Starting,
            "STARTED" => Self::Started,
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "STOPPED" => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// COMPLETED, FAILED and STOPPED: no further transitions are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(value.as_str().map(JobStatus::parse).unwrap_or_default())
    }
}

/// Counters reported by one step of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    #[serde(default, deserialize_with = "lenient::string")]
    pub step_name: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, deserialize_with = "lenient::count")]
    pub read_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub write_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub filter_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub skip_count: u64,
    #[serde(
        default,
        deserialize_with = "lenient::optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub read_skip_count: Option<u64>,
    #[serde(
        default,
        deserialize_with = "lenient::optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub process_skip_count: Option<u64>,
    #[serde(
        default,
        deserialize_with = "lenient::optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub write_skip_count: Option<u64>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub commit_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub rollback_count: u64,
    #[serde(
        default,
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<DateTime<Utc>>,
}

impl StepReport {
    /// Wall-clock duration of the step, when the backend reported both ends.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// Normalized view of one status poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub threads_used: Option<u64>,
    pub steps: Vec<StepReport>,
    pub file_name: String,
    pub file_type: String,
}

/// A completed job as kept in the history collection. Identity is `job_id`.
///
/// Every field decodes leniently: missing or malformed values fall back to
/// their defaults so that stored entries from older writers still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHistoryEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    pub job_id: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, deserialize_with = "lenient::string")]
    pub file_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub file_type: String,
    /// ISO-8601 insertion time.
    #[serde(default, deserialize_with = "lenient::string")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient::count")]
    pub duration_ms: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub threads_used: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub read_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub write_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub filter_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub skip_count: u64,
    #[serde(
        default,
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::steps")]
    pub steps: Vec<StepReport>,
}

impl JobHistoryEntry {
    /// Best-effort parse of `timestamp`, used for ordering.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        lenient::parse_timestamp(&self.timestamp)
    }
}
