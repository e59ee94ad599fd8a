use crate::{StorageMap, StorageService};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use webtone_core::{CoreError, StorageError};

/// In-process storage used by tests and by hosts that persist elsewhere.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    values: Arc<RwLock<HashMap<String, Value>>>,
    unavailable: Arc<AtomicBool>,
    writes: Arc<AtomicU64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            values: Arc::new(RwLock::new(values.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Simulates the backing service going away; every call fails until
    /// re-enabled.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.values.read().await.clone()
    }

    fn check_available(&self) -> Result<(), CoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "memory storage disabled".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl StorageService for MemoryStorage {
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, CoreError> {
        self.check_available()?;
        let values = self.values.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, entries: StorageMap) -> Result<(), CoreError> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.values.write().await.extend(entries);
        Ok(())
    }
}
