// src/history.rs

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;

use crate::models::HistoryItem;
use crate::provider::HistoryLog;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Append-only log of completed downloads in an SQLite database, partitioned
/// by an application namespace.
#[derive(Clone)]
pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    /// Opens (creating if needed) the database file and its tables.
    pub async fn open(db_path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(db_path).await?;
        let store = Self { conn };
        store.setup_database().await?;
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self, HistoryError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.setup_database().await?;
        Ok(store)
    }

    async fn setup_database(&self) -> Result<(), HistoryError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS history (
                        id          INTEGER PRIMARY KEY AUTOINCREMENT,
                        namespace   TEXT NOT NULL,
                        timestamp   INTEGER NOT NULL,
                        item_data   TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS history_namespace ON history(namespace);",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Writes one record and returns its row id. Records are never updated.
    pub async fn append_item(&self, item: HistoryItem, namespace: &str) -> Result<i64, HistoryError> {
        let item_data = serde_json::to_string(&item)?;
        let namespace = namespace.to_string();
        let timestamp = Utc::now().timestamp();

        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO history (namespace, timestamp, item_data) VALUES (?1, ?2, ?3)",
                    params![namespace, timestamp, item_data],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// All records of `namespace`, newest first.
    pub async fn list(&self, namespace: &str) -> Result<Vec<HistoryItem>, HistoryError> {
        let namespace = namespace.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, timestamp, item_data FROM history WHERE namespace = ?1 ORDER BY id DESC",
                )?;
                let rows = stmt
                    .query_map(params![namespace], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
                    })?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, timestamp, data)| -> Result<HistoryItem, HistoryError> {
                let mut item: HistoryItem = serde_json::from_str(&data)?;
                item.id = id;
                item.timestamp = timestamp;
                Ok(item)
            })
            .collect()
    }

    /// Deletes every record of `namespace`, returning how many were removed.
    pub async fn clear(&self, namespace: &str) -> Result<usize, HistoryError> {
        let namespace = namespace.to_string();
        let removed = self
            .conn
            .call(move |conn| {
                let removed = conn.execute("DELETE FROM history WHERE namespace = ?1", params![namespace])?;
                Ok(removed)
            })
            .await?;
        Ok(removed)
    }
}

#[async_trait]
impl HistoryLog for HistoryStore {
    async fn append(&self, item: HistoryItem, namespace: &str) -> Result<(), HistoryError> {
        self.append_item(item, namespace).await.map(|_| ())
    }
}
