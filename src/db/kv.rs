use async_trait::async_trait;
use tokio_rusqlite::rusqlite::OptionalExtension;
use tokio_rusqlite::{Connection, params, rusqlite};

use crate::core::KeyValueStore;
use crate::error::StorageError;

/// Key-value persistence in the `kv_store` table.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

fn backend(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(e.to_string())
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let key = key.to_string();
        self.conn
            .call(move |c| {
                c.query_row(
                    "SELECT value FROM kv_store WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
            })
            .await
            .map_err(backend)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let key = key.to_string();
        let value = value.to_string();
        self.conn
            .call(move |c| {
                c.execute(
                    "INSERT INTO kv_store (key, value, updated_at)
                     VALUES (?1, ?2, CURRENT_TIMESTAMP)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = CURRENT_TIMESTAMP",
                    params![key, value],
                )?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .map_err(backend)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let key = key.to_string();
        self.conn
            .call(move |c| {
                c.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .map_err(backend)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = prefix.to_string();
        self.conn
            .call(move |c| {
                // substr comparison avoids LIKE treating '_' and '%' as wildcards
                let mut stmt = c.prepare(
                    "SELECT key FROM kv_store
                     WHERE substr(key, 1, length(?1)) = ?1
                     ORDER BY key",
                )?;
                let keys = stmt
                    .query_map(params![prefix], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok::<Vec<String>, rusqlite::Error>(keys)
            })
            .await
            .map_err(backend)
    }
}
