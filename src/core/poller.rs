//! Status polling for one tracked job at a time.
//!
//! `track` starts a ticker that fetches the job's status immediately and then
//! on every interval. Each tick's fetch runs on its own task, so slow fetches
//! may overlap and finish out of order. Results are keyed by a generation
//! number (bumped on every `track`/`stop`), the job id, and a per-tick
//! sequence number so late arrivals never overwrite newer state.
//!
//! The first terminal status observed for a job is recorded in history once;
//! a one-shot flag suppresses any further terminal results for that job.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{EventBus, MonitorEvent};
use super::history::HistoryStore;
use super::metrics;
use super::models::{JobHistoryEntry, JobSnapshot, JobStatus};
use super::normalizer::{self, UNKNOWN_FILE, UNKNOWN_TYPE};
use super::source::StatusSource;
use crate::error::TrackError;
use crate::logging::LogThrottle;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Tracking { job_id: String },
    Finished { job_id: String, status: JobStatus },
}

/// What became of one status result.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Superseded, for a job no longer tracked, or after completion.
    Stale,
    Progress(JobSnapshot),
    /// Terminal status seen again after it was already processed.
    Duplicate,
    Completed(JobHistoryEntry),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Idle,
    Tracking,
    Finished(JobStatus),
}

#[derive(Default)]
struct Tracking {
    phase: Phase,
    job_id: Option<String>,
    file_name: Option<String>,
    file_type: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed: bool,
    generation: u64,
    next_tick: u64,
    latest_applied: Option<u64>,
    cancel: Option<CancellationToken>,
    last_snapshot: Option<JobSnapshot>,
}

#[derive(Clone)]
pub struct PollingController {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn StatusSource>,
    history: HistoryStore,
    events: EventBus,
    interval: Duration,
    state: Mutex<Tracking>,
    progress_log: LogThrottle,
}

impl PollingController {
    pub fn new(source: Arc<dyn StatusSource>, history: HistoryStore, events: EventBus) -> Self {
        Self::with_interval(source, history, events, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(
        source: Arc<dyn StatusSource>,
        history: HistoryStore,
        events: EventBus,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                history,
                events,
                interval,
                state: Mutex::new(Tracking::default()),
                progress_log: LogThrottle::new(PROGRESS_LOG_INTERVAL),
            }),
        }
    }

    /// Start tracking `job_id`, replacing any job tracked so far. The first
    /// fetch happens immediately. Must be called inside a tokio runtime.
    pub fn track(
        &self,
        job_id: &str,
        file_name: Option<&str>,
        file_type: Option<&str>,
    ) -> Result<(), TrackError> {
        let job_id = validate_job_id(job_id)?;

        let (generation, token) = {
            let mut state = self.lock();
            if let Some(previous) = state.cancel.take() {
                previous.cancel();
            }

            let token = CancellationToken::new();
            state.generation += 1;
            state.phase = Phase::Tracking;
            state.job_id = Some(job_id.clone());
            state.file_name = non_empty(file_name);
            state.file_type = non_empty(file_type);
            state.started_at = Some(Utc::now());
            state.completed = false;
            state.next_tick = 0;
            state.latest_applied = None;
            state.last_snapshot = None;
            state.cancel = Some(token.clone());
            (state.generation, token)
        };

        info!(job_id = %job_id, interval_ms = self.inner.interval.as_millis() as u64, "Tracking job");
        self.inner.progress_log.reset();
        tokio::spawn(self.clone().run_ticker(generation, token));
        Ok(())
    }

    /// Point the current tracking session at a different job id, e.g. once
    /// the backend has assigned the real one. Results for the old id are
    /// discarded from here on.
    pub fn update_job_id(&self, job_id: &str) -> Result<(), TrackError> {
        let job_id = validate_job_id(job_id)?;
        let mut state = self.lock();
        debug!(from = ?state.job_id, to = %job_id, "Updating tracked job id");
        state.job_id = Some(job_id);
        Ok(())
    }

    /// Stop polling. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        let mut state = self.lock();
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        state.generation += 1;
        if state.phase == Phase::Tracking {
            state.phase = Phase::Idle;
            debug!(job_id = ?state.job_id, "Polling stopped");
        }
    }

    pub fn state(&self) -> TrackerState {
        let state = self.lock();
        let job_id = state.job_id.clone().unwrap_or_default();
        match state.phase {
            Phase::Idle => TrackerState::Idle,
            Phase::Tracking => TrackerState::Tracking { job_id },
            Phase::Finished(status) => TrackerState::Finished { job_id, status },
        }
    }

    pub fn current_job_id(&self) -> Option<String> {
        self.lock().job_id.clone()
    }

    pub fn last_snapshot(&self) -> Option<JobSnapshot> {
        self.lock().last_snapshot.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.lock()
            .cancel
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    async fn run_ticker(self, generation: u64, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.inner.interval);
        // Ticks fire on schedule whether or not earlier fetches finished.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some((job_id, seq)) = self.begin_tick(generation) else {
                        break;
                    };
                    tokio::spawn(self.clone().poll_once(generation, seq, job_id));
                }
            }
        }
    }

    fn begin_tick(&self, generation: u64) -> Option<(String, u64)> {
        let mut state = self.lock();
        if state.generation != generation || state.phase != Phase::Tracking {
            return None;
        }
        let job_id = state.job_id.clone()?;
        let seq = state.next_tick;
        state.next_tick += 1;
        Some((job_id, seq))
    }

    async fn poll_once(self, generation: u64, seq: u64, job_id: String) {
        match self.inner.source.fetch_status(&job_id).await {
            Ok(payload) => {
                self.apply(generation, seq, &job_id, &payload).await;
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Status fetch failed, retrying on next tick");
            }
        }
    }

    /// Fold one status payload into the tracking state.
    async fn apply(&self, generation: u64, seq: u64, job_id: &str, payload: &Value) -> PollOutcome {
        let snapshot = normalizer::normalize(payload, job_id);

        let pending = {
            let mut state = self.lock();

            if state.generation != generation || state.job_id.as_deref() != Some(job_id) {
                debug!(job_id = %job_id, seq, "Discarding result for job no longer tracked");
                return PollOutcome::Stale;
            }

            if snapshot.status.is_terminal() {
                if state.completed {
                    debug!(job_id = %job_id, status = %snapshot.status, "Terminal status already processed");
                    return PollOutcome::Duplicate;
                }

                state.completed = true;
                if let Some(token) = state.cancel.take() {
                    token.cancel();
                }
                state.phase = Phase::Finished(snapshot.status);
                state.latest_applied = state.latest_applied.max(Some(seq));
                state.last_snapshot = Some(snapshot.clone());

                Some(build_entry(&state, job_id, &snapshot, Utc::now()))
            } else {
                if state.completed {
                    debug!(job_id = %job_id, seq, "Ignoring progress after completion");
                    return PollOutcome::Stale;
                }
                if state.latest_applied.is_some_and(|latest| latest >= seq) {
                    debug!(job_id = %job_id, seq, "Ignoring out-of-order status result");
                    return PollOutcome::Stale;
                }
                state.latest_applied = Some(seq);
                state.last_snapshot = Some(snapshot.clone());
                None
            }
        };

        self.inner
            .events
            .emit(&MonitorEvent::Snapshot(snapshot.clone()));

        let Some(entry) = pending else {
            if self.inner.progress_log.should_log(job_id) {
                info!(job_id = %job_id, status = %snapshot.status, steps = snapshot.steps.len(), "Job in progress");
            } else {
                debug!(job_id = %job_id, status = %snapshot.status, "Job in progress");
            }
            return PollOutcome::Progress(snapshot);
        };

        info!(
            job_id = %job_id,
            status = %entry.status,
            duration_ms = entry.duration_ms,
            "Job reached terminal status"
        );

        let stored = self.inner.history.record(entry).await;
        self.inner
            .events
            .emit(&MonitorEvent::JobCompleted(stored.clone()));
        PollOutcome::Completed(stored)
    }

    fn lock(&self) -> MutexGuard<'_, Tracking> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn validate_job_id(job_id: &str) -> Result<String, TrackError> {
    let job_id = job_id.trim();
    if job_id.is_empty() {
        return Err(TrackError::EmptyJobId);
    }
    Ok(job_id.to_string())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// History entry for a job that just reached `snapshot.status`.
///
/// The backend's start time, when reported, takes precedence over the
/// moment tracking began; the end is when the terminal status was observed.
fn build_entry(
    state: &Tracking,
    job_id: &str,
    snapshot: &JobSnapshot,
    observed_at: DateTime<Utc>,
) -> JobHistoryEntry {
    let started = snapshot
        .start_time
        .or(state.started_at)
        .unwrap_or(observed_at);
    let duration_ms = (observed_at - started).num_milliseconds().max(0) as u64;

    let file_name = state
        .file_name
        .clone()
        .or_else(|| Some(snapshot.file_name.clone()).filter(|n| n != UNKNOWN_FILE))
        .unwrap_or_else(|| UNKNOWN_FILE.to_string());
    let file_type = state
        .file_type
        .clone()
        .or_else(|| Some(snapshot.file_type.clone()).filter(|t| t != UNKNOWN_TYPE))
        .or_else(|| normalizer::file_type_from_name(&file_name))
        .unwrap_or_else(|| UNKNOWN_TYPE.to_string());

    let counts = metrics::history_counts(&snapshot.steps);

    JobHistoryEntry {
        job_id: job_id.to_string(),
        status: snapshot.status,
        file_name,
        file_type,
        timestamp: observed_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        duration_ms,
        threads_used: snapshot.threads_used.unwrap_or(0),
        read_count: counts.read_count,
        write_count: counts.write_count,
        filter_count: counts.filter_count,
        skip_count: counts.skip_count,
        start_time: Some(started),
        end_time: snapshot.end_time.or(Some(observed_at)),
        steps: snapshot.steps.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryStore, SimulatedSource};
    use serde_json::json;

    const LONG: Duration = Duration::from_secs(3600);

    fn controller(source: SimulatedSource) -> (PollingController, HistoryStore) {
        let events = EventBus::new();
        let history = HistoryStore::new(Arc::new(MemoryStore::new()), events.clone());
        let controller =
            PollingController::with_interval(Arc::new(source), history.clone(), events, LONG);
        (controller, history)
    }

    fn running() -> SimulatedSource {
        let source = SimulatedSource::new();
        source.push_status("RUNNING");
        source
    }

    fn generation(controller: &PollingController) -> u64 {
        controller.lock().generation
    }

    fn completed_payload() -> Value {
        json!({
            "status": "COMPLETED",
            "threadsUsed": 2,
            "steps": [
                {"stepName": "read", "readCount": 100, "writeCount": 100},
                {"stepName": "write", "readCount": 90, "writeCount": 80, "filterCount": 5,
                 "readSkipCount": 1, "processSkipCount": 2, "writeSkipCount": 2}
            ]
        })
    }

    #[tokio::test]
    async fn empty_job_id_is_rejected() {
        let (controller, _) = controller(running());
        assert_eq!(controller.track("  ", None, None), Err(TrackError::EmptyJobId));
        assert_eq!(controller.update_job_id(""), Err(TrackError::EmptyJobId));
        assert_eq!(controller.state(), TrackerState::Idle);
    }

    #[tokio::test]
    async fn stop_is_idempotent_even_when_idle() {
        let (controller, _) = controller(running());
        controller.stop();
        controller.stop();
        assert_eq!(controller.state(), TrackerState::Idle);

        controller.track("job-1", None, None).unwrap();
        assert!(controller.is_polling());
        controller.stop();
        controller.stop();
        assert!(!controller.is_polling());
        assert_eq!(controller.state(), TrackerState::Idle);
    }

    #[tokio::test]
    async fn terminal_status_is_processed_once() {
        let (controller, history) = controller(running());
        controller
            .track("job-1", Some("sales.csv"), Some("csv"))
            .unwrap();
        let current = generation(&controller);

        let first = controller
            .apply(current, 100, "job-1", &completed_payload())
            .await;
        let second = controller
            .apply(current, 101, "job-1", &completed_payload())
            .await;

        let PollOutcome::Completed(entry) = first else {
            panic!("expected completion, got {:?}", first);
        };
        assert_eq!(second, PollOutcome::Duplicate);
        assert_eq!(history.entries().await.len(), 1);
        assert!(!controller.is_polling());
        assert_eq!(
            controller.state(),
            TrackerState::Finished {
                job_id: "job-1".into(),
                status: JobStatus::Completed
            }
        );

        // Last step's counters, not the totals.
        assert_eq!(entry.read_count, 90);
        assert_eq!(entry.write_count, 80);
        assert_eq!(entry.filter_count, 5);
        assert_eq!(entry.skip_count, 5);
        assert_eq!(entry.threads_used, 2);
        assert_eq!(entry.file_name, "sales.csv");
        assert_eq!(entry.file_type, "csv");
        assert_eq!(entry.steps.len(), 2);
    }

    #[tokio::test]
    async fn out_of_order_progress_is_discarded() {
        let (controller, _) = controller(running());
        controller.track("job-1", None, None).unwrap();
        let current = generation(&controller);

        let newer = json!({"status": "RUNNING", "steps": [{"readCount": 50}]});
        let older = json!({"status": "STARTING", "steps": []});

        assert!(matches!(
            controller.apply(current, 10, "job-1", &newer).await,
            PollOutcome::Progress(_)
        ));
        assert_eq!(
            controller.apply(current, 9, "job-1", &older).await,
            PollOutcome::Stale
        );
        assert_eq!(
            controller.last_snapshot().map(|s| s.status),
            Some(JobStatus::Running)
        );
    }

    #[tokio::test]
    async fn results_for_untracked_jobs_are_discarded() {
        let (controller, history) = controller(running());
        controller.track("job-1", None, None).unwrap();
        let old = generation(&controller);

        controller.update_job_id("job-2").unwrap();
        assert_eq!(
            controller.apply(old, 50, "job-1", &completed_payload()).await,
            PollOutcome::Stale
        );

        controller.stop();
        assert_eq!(
            controller.apply(old, 51, "job-2", &completed_payload()).await,
            PollOutcome::Stale
        );
        assert!(history.entries().await.is_empty());
    }

    #[tokio::test]
    async fn retracking_resets_the_one_shot_flag() {
        let (controller, history) = controller(running());

        controller.track("job-1", None, None).unwrap();
        let g1 = generation(&controller);
        controller.apply(g1, 10, "job-1", &completed_payload()).await;

        controller.track("job-2", None, None).unwrap();
        let g2 = generation(&controller);
        assert!(matches!(
            controller.apply(g2, 10, "job-2", &completed_payload()).await,
            PollOutcome::Completed(_)
        ));
        assert_eq!(history.entries().await.len(), 2);
    }

    #[test]
    fn entry_prefers_server_start_time_and_snapshot_file_info() {
        let state = Tracking {
            started_at: Some("2024-03-01T10:00:00Z".parse().unwrap()),
            ..Default::default()
        };
        let snapshot = normalizer::normalize(
            &json!({
                "status": "FAILED",
                "startTime": "2024-03-01T10:00:30Z",
                "jobParameters": {"filePath": "{value=/in/data.JSON, type=java.lang.String}"}
            }),
            "j",
        );
        let observed: DateTime<Utc> = "2024-03-01T10:01:00Z".parse().unwrap();

        let entry = build_entry(&state, "j", &snapshot, observed);
        assert_eq!(entry.duration_ms, 30_000);
        assert_eq!(entry.file_name, "data.JSON");
        assert_eq!(entry.file_type, "json");
        assert_eq!(entry.status, JobStatus::Failed);
        assert_eq!(entry.read_count, 0);
        assert_eq!(entry.timestamp, "2024-03-01T10:01:00.000Z");
    }

    #[test]
    fn entry_duration_never_negative() {
        let state = Tracking::default();
        let snapshot = normalizer::normalize(
            &json!({"status": "STOPPED", "startTime": "2030-01-01T00:00:00Z"}),
            "j",
        );
        let entry = build_entry(&state, "j", &snapshot, "2024-01-01T00:00:00Z".parse().unwrap());
        assert_eq!(entry.duration_ms, 0);
        assert_eq!(entry.file_name, UNKNOWN_FILE);
        assert_eq!(entry.file_type, UNKNOWN_TYPE);
    }
}
