use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::core::{KeyValueStore, StatusSource};
use crate::db;

mod http;
mod memory;
mod simulated;

pub use http::HttpStatusClient;
pub use memory::MemoryStore;
pub use simulated::SimulatedSource;

/// Key-value store for history: SQLite on disk, or process memory when
/// `ephemeral` is set.
pub async fn open_store(database_path: &Path, ephemeral: bool) -> Result<Arc<dyn KeyValueStore>> {
    if ephemeral {
        return Ok(Arc::new(MemoryStore::new()));
    }

    let conn = db::init(database_path).await?;
    Ok(Arc::new(db::kv::SqliteStore::new(conn)))
}

/// Status source for the tracker: the real HTTP endpoint, or a simulated
/// job that walks through STARTING, RUNNING and COMPLETED.
pub fn status_source(
    base_url: &str,
    timeout: std::time::Duration,
    simulation: bool,
) -> Result<Arc<dyn StatusSource>> {
    if simulation {
        return Ok(Arc::new(SimulatedSource::progression(3)));
    }

    Ok(Arc::new(HttpStatusClient::new(base_url, timeout)?))
}
