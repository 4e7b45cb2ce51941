//! Durable, deduplicated history of completed jobs.
//!
//! Two tiers back the collection:
//!
//! - the primary list under [`PRIMARY_KEY`], newest first, capped at the
//!   configured limit when persisted
//! - one fallback record per job under `etl-job-{jobId}`, written for every
//!   terminal job regardless of whether the primary write succeeded
//!
//! [`HistoryStore::load`] folds any fallback records back into the primary
//! list on startup and deletes them once the reconciled list is persisted.
//! A store that is mutated or queried before `load` hydrates itself the same
//! way first, so a write never replaces durable history it has not read.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::{EventBus, MonitorEvent};
use super::models::JobHistoryEntry;
use super::normalizer::{UNKNOWN_FILE, UNKNOWN_TYPE, file_type_from_name};
use super::storage::KeyValueStore;
use crate::error::StorageError;

pub const PRIMARY_KEY: &str = "etlJobHistory";
pub const FALLBACK_PREFIX: &str = "etl-job-";
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

pub fn fallback_key(job_id: &str) -> String {
    format!("{FALLBACK_PREFIX}{job_id}")
}

#[derive(Clone)]
pub struct HistoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    kv: Arc<dyn KeyValueStore>,
    // Held across persistence so read-modify-write cycles never interleave.
    state: Mutex<State>,
    limit: usize,
    events: EventBus,
}

#[derive(Default)]
struct State {
    entries: Vec<JobHistoryEntry>,
    loaded: bool,
}

impl HistoryStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, events: EventBus) -> Self {
        Self::with_limit(kv, events, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limit(kv: Arc<dyn KeyValueStore>, events: EventBus, limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                kv,
                state: Mutex::new(State::default()),
                limit,
                events,
            }),
        }
    }

    /// Read the primary list, reconcile fallback records into it and return
    /// the resulting newest-first collection. Never fails: unreadable state
    /// degrades to an empty list.
    pub async fn load(&self) -> Vec<JobHistoryEntry> {
        let mut state = self.inner.state.lock().await;
        state.loaded = false;
        self.hydrate(&mut state).await;

        let snapshot = state.entries.clone();
        drop(state);

        self.inner
            .events
            .emit(&MonitorEvent::HistoryChanged(snapshot.clone()));
        snapshot
    }

    /// Insert or replace `entry`, moving it to the front, and persist.
    /// Returns the entry as stored, with defaults filled in.
    pub async fn upsert(&self, entry: JobHistoryEntry) -> JobHistoryEntry {
        let entry = fill_defaults(entry);
        let mut state = self.inner.state.lock().await;
        self.hydrate(&mut state).await;
        let entries = &mut state.entries;

        if let Some(pos) = entries.iter().position(|e| e.job_id == entry.job_id) {
            debug!(job_id = %entry.job_id, "Replacing existing history entry");
            entries.remove(pos);
        }
        entries.insert(0, entry.clone());

        if let Err(e) = self.persist(entries).await {
            warn!(job_id = %entry.job_id, error = %e, "Failed to persist job history");
        }

        let snapshot = entries.clone();
        drop(state);

        info!(job_id = %entry.job_id, status = %entry.status, "Job added to history");
        self.inner.events.emit(&MonitorEvent::HistoryChanged(snapshot));
        entry
    }

    /// Persist-then-mirror: upsert into the primary list, then write the
    /// per-job fallback record so the entry survives a missed primary write.
    pub async fn record(&self, entry: JobHistoryEntry) -> JobHistoryEntry {
        let stored = self.upsert(entry).await;
        if let Err(e) = self.mirror(&stored).await {
            warn!(job_id = %stored.job_id, error = %e, "Failed to write fallback history record");
        }
        stored
    }

    /// Empty the collection, including fallback records not yet reconciled
    /// so a cleared job cannot reappear on the next load.
    pub async fn clear(&self) {
        let mut state = self.inner.state.lock().await;
        state.entries.clear();
        state.loaded = true;

        if let Err(e) = self.persist(&state.entries).await {
            warn!(error = %e, "Failed to persist cleared job history");
        }
        match self.inner.kv.keys_with_prefix(FALLBACK_PREFIX).await {
            Ok(keys) => {
                for key in keys {
                    if let Err(e) = self.inner.kv.remove(&key).await {
                        warn!(key = %key, error = %e, "Failed to remove fallback record");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to list fallback records"),
        }
        drop(state);

        info!("Job history cleared");
        self.inner.events.emit(&MonitorEvent::HistoryChanged(Vec::new()));
    }

    /// The in-memory collection, newest first. Not capped.
    pub async fn entries(&self) -> Vec<JobHistoryEntry> {
        let mut state = self.inner.state.lock().await;
        self.hydrate(&mut state).await;
        state.entries.clone()
    }

    pub async fn get(&self, job_id: &str) -> Option<JobHistoryEntry> {
        let mut state = self.inner.state.lock().await;
        self.hydrate(&mut state).await;
        state.entries.iter().find(|e| e.job_id == job_id).cloned()
    }

    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    /// Populate the working set from storage unless that already happened.
    async fn hydrate(&self, state: &mut State) {
        if state.loaded {
            return;
        }
        let primary = self.read_primary().await;
        state.entries = self.reconcile_on_startup(primary).await;
        state.loaded = true;
    }

    async fn read_primary(&self) -> Vec<JobHistoryEntry> {
        let raw = match self.inner.kv.get(PRIMARY_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read job history, starting empty");
                return Vec::new();
            }
        };

        let items = match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Stored job history is corrupt, starting empty");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value::<JobHistoryEntry>(item).ok())
            .map(fill_defaults)
            .filter(|e| seen.insert(e.job_id.clone()))
            .collect()
    }

    async fn reconcile_on_startup(&self, mut entries: Vec<JobHistoryEntry>) -> Vec<JobHistoryEntry> {
        let recovered = self.scan_fallback().await;
        if recovered.is_empty() {
            sort_newest_first(&mut entries);
            return entries;
        }

        let mut added = 0usize;
        let mut consumed = Vec::with_capacity(recovered.len());
        for (key, entry) in recovered {
            if entries.iter().any(|e| e.job_id == entry.job_id) {
                debug!(job_id = %entry.job_id, "Fallback record already in history");
            } else {
                entries.insert(0, fill_defaults(entry));
                added += 1;
            }
            consumed.push(key);
        }
        sort_newest_first(&mut entries);

        info!(
            recovered = added,
            consumed = consumed.len(),
            "Reconciled fallback history records"
        );

        // Fallback records are only dropped once the merged list is durable.
        match self.persist(&entries).await {
            Ok(()) => {
                for key in consumed {
                    if let Err(e) = self.inner.kv.remove(&key).await {
                        warn!(key = %key, error = %e, "Failed to remove consumed fallback record");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist reconciled history, keeping fallback records")
            }
        }

        entries
    }

    async fn scan_fallback(&self) -> Vec<(String, JobHistoryEntry)> {
        let keys = match self.inner.kv.keys_with_prefix(FALLBACK_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list fallback records");
                return Vec::new();
            }
        };

        let mut recovered = Vec::new();
        for key in keys {
            let raw = match self.inner.kv.get(&key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to read fallback record");
                    continue;
                }
            };

            let entry = serde_json::from_str::<Value>(&raw)
                .ok()
                .filter(Value::is_object)
                .and_then(|v| serde_json::from_value::<JobHistoryEntry>(v).ok());

            match entry {
                Some(entry) if !entry.job_id.is_empty() => {
                    debug!(job_id = %entry.job_id, "Recovered job from fallback record");
                    recovered.push((key, entry));
                }
                _ => warn!(key = %key, "Unreadable fallback record, leaving it in place"),
            }
        }
        recovered
    }

    async fn persist(&self, entries: &[JobHistoryEntry]) -> Result<(), StorageError> {
        let capped = &entries[..entries.len().min(self.inner.limit)];
        let raw = serde_json::to_string(capped)?;
        self.inner.kv.set(PRIMARY_KEY, &raw).await
    }

    async fn mirror(&self, entry: &JobHistoryEntry) -> Result<(), StorageError> {
        let mut value = serde_json::to_value(entry)?;
        if let Value::Object(map) = &mut value {
            map.insert("savedAt".to_string(), Value::String(now_iso()));
        }
        let raw = serde_json::to_string(&value)?;
        self.inner.kv.set(&fallback_key(&entry.job_id), &raw).await
    }
}

/// Defaults for fields every stored entry must carry.
fn fill_defaults(mut entry: JobHistoryEntry) -> JobHistoryEntry {
    if entry.job_id.trim().is_empty() {
        entry.job_id = format!("job-{}", Uuid::now_v7());
        warn!(job_id = %entry.job_id, "History entry missing job id, generated one");
    }
    if entry.timestamp.trim().is_empty() {
        entry.timestamp = now_iso();
    }
    if entry.file_name.trim().is_empty() {
        entry.file_name = UNKNOWN_FILE.to_string();
    }
    if entry.file_type.trim().is_empty() {
        entry.file_type =
            file_type_from_name(&entry.file_name).unwrap_or_else(|| UNKNOWN_TYPE.to_string());
    }
    entry
}

/// Descending by parsed timestamp; entries whose timestamp cannot be parsed
/// keep their relative order after all dated ones.
fn sort_newest_first(entries: &mut [JobHistoryEntry]) {
    entries.sort_by(|a, b| b.recorded_at().cmp(&a.recorded_at()));
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
