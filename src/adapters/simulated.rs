use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::core::StatusSource;
use crate::error::FetchError;

#[derive(Clone)]
enum Scripted {
    Payload(Value),
    Failure,
}

/// A status source that replays a script. Each fetch consumes the next
/// scripted response; the final one repeats forever.
#[derive(Default)]
pub struct SimulatedSource {
    script: Mutex<VecDeque<Scripted>>,
    fetches: AtomicUsize,
    delay: Option<Duration>,
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch, so that ticks overlap when the delay exceeds the
    /// poll interval.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_payload(&self, payload: Value) -> &Self {
        self.lock().push_back(Scripted::Payload(payload));
        self
    }

    pub fn push_status(&self, status: &str) -> &Self {
        self.push_payload(json!({ "status": status, "steps": [] }))
    }

    pub fn push_failure(&self) -> &Self {
        self.lock().push_back(Scripted::Failure);
        self
    }

    /// A job that starts, runs for `running_ticks` polls with growing
    /// counters, then completes.
    pub fn progression(running_ticks: u64) -> Self {
        let source = Self::new();
        source.push_payload(json!({ "status": "STARTING", "steps": [] }));
        for tick in 1..=running_ticks {
            source.push_payload(json!({
                "status": "RUNNING",
                "threadsUsed": 4,
                "steps": [simulated_step("RUNNING", tick * 100)]
            }));
        }
        source.push_payload(json!({
            "status": "COMPLETED",
            "threadsUsed": 4,
            "steps": [simulated_step("COMPLETED", (running_ticks + 1) * 100)]
        }));
        source
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Scripted>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next(&self) -> Option<Scripted> {
        let mut script = self.lock();
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

fn simulated_step(status: &str, read: u64) -> Value {
    json!({
        "stepName": "etlStep",
        "status": status,
        "readCount": read,
        "writeCount": read * 9 / 10,
        "filterCount": read / 20,
        "skipCount": read / 20
    })
}

#[async_trait]
impl StatusSource for SimulatedSource {
    async fn fetch_status(&self, job_id: &str) -> Result<Value, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.next();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match next {
            Some(Scripted::Payload(payload)) => Ok(payload),
            Some(Scripted::Failure) => Err(FetchError::Status {
                job_id: job_id.to_string(),
                status: 503,
            }),
            None => Err(FetchError::Malformed {
                job_id: job_id.to_string(),
                reason: "no scripted response".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_response_repeats() {
        let source = SimulatedSource::new();
        source.push_failure().push_status("COMPLETED");

        assert!(source.fetch_status("1").await.is_err());
        for _ in 0..3 {
            let payload = source.fetch_status("1").await.unwrap();
            assert_eq!(payload["status"], "COMPLETED");
        }
        assert_eq!(source.fetch_count(), 4);
    }

    #[tokio::test]
    async fn progression_ends_completed() {
        let source = SimulatedSource::progression(2);
        let mut statuses = Vec::new();
        for _ in 0..5 {
            let payload = source.fetch_status("1").await.unwrap();
            statuses.push(payload["status"].as_str().unwrap().to_string());
        }
        assert_eq!(
            statuses,
            ["STARTING", "RUNNING", "RUNNING", "COMPLETED", "COMPLETED"]
        );
    }

    #[tokio::test]
    async fn empty_script_is_a_fetch_error() {
        let source = SimulatedSource::new();
        assert!(matches!(
            source.fetch_status("1").await,
            Err(FetchError::Malformed { .. })
        ));
    }
}
