use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use storage::{decode, StorageMap, StorageService};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use webtone_core::{CoreError, ErrorExt, ScoreVector};

pub const CACHE_KEY: &str = "processedPosts";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Capture time in epoch milliseconds.
    pub timestamp: i64,
    pub scores: ScoreVector,
}

/// Post id -> scores, persisted under a single storage key with a fixed TTL.
#[derive(Debug)]
pub struct ClassificationCache<S> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    write_lock: Mutex<()>,
}

impl<S: StorageService> ClassificationCache<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>, ttl: chrono::Duration) -> Self {
        Self {
            storage,
            clock,
            ttl,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn get(&self, id: Option<&str>) -> Option<ScoreVector> {
        let id = id.filter(|id| !id.is_empty())?;

        let mut entries = match self.load().await {
            Ok(entries) => entries,
            Err(e) => {
                e.log_warn();
                return None;
            }
        };

        let raw = entries.remove(id)?;
        let entry: CacheEntry = decode(CACHE_KEY, raw).ok()?;
        if self.is_expired(entry.timestamp) {
            debug!("Cache entry for {} expired", id);
            return None;
        }
        Some(entry.scores)
    }

    /// Stores `scores` under `id` and drops every expired or unreadable entry
    /// in the same write.
    pub async fn put(&self, id: Option<&str>, scores: &ScoreVector) -> Result<(), CoreError> {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        let entries = self.load().await.unwrap_or_else(|e| {
            warn!("Rebuilding classification cache: {}", e);
            StorageMap::new()
        });

        let before = entries.len();
        let mut kept: StorageMap = entries
            .into_iter()
            .filter(|(_, raw)| {
                decode::<CacheEntry>(CACHE_KEY, raw.clone())
                    .is_ok_and(|entry| !self.is_expired(entry.timestamp))
            })
            .collect();
        let pruned = before - kept.len();
        if pruned > 0 {
            debug!("Pruned {} stale cache entries", pruned);
        }

        let entry = CacheEntry {
            timestamp: self.clock.now().timestamp_millis(),
            scores: scores.clone(),
        };
        kept.insert(id.to_string(), storage::encode(CACHE_KEY, &entry)?);

        self.storage
            .set_one(CACHE_KEY, Value::Object(kept))
            .await
    }

    async fn load(&self) -> Result<StorageMap, CoreError> {
        match self.storage.get_one(CACHE_KEY).await? {
            Some(Value::Object(entries)) => Ok(entries),
            Some(Value::Null) | None => Ok(StorageMap::new()),
            Some(other) => decode(CACHE_KEY, other),
        }
    }

    fn is_expired(&self, timestamp: i64) -> bool {
        self.clock.now().timestamp_millis() - timestamp > self.ttl.num_milliseconds()
    }
}
