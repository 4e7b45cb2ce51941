//! Maps raw status payloads from the ETL backend into [`JobSnapshot`]s.
//!
//! Normalization never fails. Fields that are missing or unreadable take
//! their defaults, and file information that cannot be recovered becomes
//! [`UNKNOWN_FILE`] / [`UNKNOWN_TYPE`].

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::lenient;
use super::models::{JobSnapshot, JobStatus};

pub const UNKNOWN_FILE: &str = "Unknown file";
pub const UNKNOWN_TYPE: &str = "Unknown type";

// Spring batch renders job parameters as "{value=/some/path, type=class java.lang.String, ...}"
static DESCRIPTOR_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{value=([^,}]+)").expect("descriptor pattern is valid"));

/// Build a snapshot from a status payload. `tracked_job_id` is used when the
/// payload does not name the job itself.
pub fn normalize(raw: &Value, tracked_job_id: &str) -> JobSnapshot {
    let job_id = match raw.get("jobId") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => tracked_job_id.to_string(),
    };

    let status = raw
        .get("status")
        .and_then(Value::as_str)
        .map(JobStatus::parse)
        .unwrap_or_default();

    let threads_used = raw
        .get("threadsUsed")
        .and_then(lenient::count_from_value)
        .filter(|&n| n > 0)
        .or_else(|| raw.get("maxThreads").and_then(lenient::count_from_value));

    let (file_name, file_type) = file_info(raw);

    JobSnapshot {
        job_id,
        status,
        start_time: raw.get("startTime").and_then(lenient::timestamp_from_value),
        end_time: raw.get("endTime").and_then(lenient::timestamp_from_value),
        threads_used,
        steps: raw
            .get("steps")
            .map(lenient::steps_from_value)
            .unwrap_or_default(),
        file_name,
        file_type,
    }
}

/// File name and type for a payload: direct fields first, then the
/// `jobParameters` map, then the file name's extension for the type.
pub fn file_info(raw: &Value) -> (String, String) {
    let params = raw.get("jobParameters");

    let file_name = non_empty_str(raw.get("fileName"))
        .or_else(|| {
            params
                .and_then(|p| p.get("filePath"))
                .and_then(descriptor_value)
                .and_then(|path| file_name_from_path(&path))
        })
        .unwrap_or_else(|| UNKNOWN_FILE.to_string());

    let file_type = non_empty_str(raw.get("fileType"))
        .or_else(|| {
            params
                .and_then(|p| p.get("fileType"))
                .and_then(descriptor_value)
        })
        .or_else(|| file_type_from_name(&file_name))
        .unwrap_or_else(|| UNKNOWN_TYPE.to_string());

    (file_name, file_type)
}

/// Last path segment, splitting on both `/` and `\`.
pub fn file_name_from_path(path: &str) -> Option<String> {
    path.rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Lower-cased extension of a file name. `None` for the unknown placeholder
/// or names without one.
pub fn file_type_from_name(name: &str) -> Option<String> {
    if name == UNKNOWN_FILE {
        return None;
    }
    name.rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Inner value of a job parameter, which may be a plain string, a
/// `{value=...}` descriptor string, or a `{"value": ...}` object.
fn descriptor_value(param: &Value) -> Option<String> {
    match param {
        Value::String(s) if s.contains("{value=") => DESCRIPTOR_VALUE
            .captures(s)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|v| !v.is_empty()),
        Value::String(s) => Some(s.trim().to_string()).filter(|v| !v.is_empty()),
        Value::Object(map) => map.get("value").and_then(descriptor_value),
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
