use crate::{StorageMap, StorageService};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};
use webtone_core::{CoreError, StorageError};

const CREATE_KV_TABLE: &str = "CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
)";

/// Key-value storage persisted in a single SQLite table. Values are stored as
/// JSON text.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    connection_string: String,
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Opens the pool and runs migrations.
    pub async fn connect(connection_string: &str) -> Result<Self, CoreError> {
        info!("Opening storage at {}", connection_string);

        // In-memory databases are per-connection, so keep a single one.
        let max_connections = if connection_string.contains(":memory:") {
            1
        } else {
            4
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .map_err(|e| StorageError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        let storage = Self {
            connection_string: connection_string.to_string(),
            pool,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::query(CREATE_KV_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|_| StorageError::MigrationFailed {
                migration: "create kv_store".to_string(),
            })?;
        Ok(())
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl StorageService for SqliteStorage {
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, CoreError> {
        let mut values = StorageMap::new();

        for key in keys {
            let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
                .bind(*key)
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::from)?;

            let Some(row) = row else { continue };
            let raw: String = row.try_get("value").map_err(StorageError::from)?;

            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => {
                    values.insert(key.to_string(), value);
                }
                Err(e) => {
                    // Treated as missing so callers substitute defaults.
                    debug!("Ignoring undecodable value for {}: {}", key, e);
                }
            }
        }

        Ok(values)
    }

    async fn set(&self, entries: StorageMap) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        for (key, value) in &entries {
            sqlx::query(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, strftime('%s', 'now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(value.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|_| StorageError::QueryFailed {
                query: format!("upsert {}", key),
            })?;
        }

        tx.commit().await.map_err(StorageError::from)?;
        debug!("Persisted {} storage keys", entries.len());
        Ok(())
    }
}
