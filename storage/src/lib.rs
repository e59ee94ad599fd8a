//! Async key-value storage boundary.
//!
//! Settings, the classification cache and telemetry all persist through
//! [`StorageService`]. Callers never assume synchronous access.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use webtone_core::{CoreError, StorageError};

pub mod memory;
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

pub type StorageMap = serde_json::Map<String, Value>;

pub trait StorageService {
    /// Returns the stored values for `keys`. Missing keys are simply absent
    /// from the returned map.
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, CoreError>;

    /// Writes every entry, replacing existing values.
    async fn set(&self, entries: StorageMap) -> Result<(), CoreError>;

    async fn get_one(&self, key: &str) -> Result<Option<Value>, CoreError> {
        let mut values = self.get(&[key]).await?;
        Ok(values.remove(key))
    }

    async fn set_one(&self, key: &str, value: Value) -> Result<(), CoreError> {
        let mut entries = StorageMap::new();
        entries.insert(key.to_string(), value);
        self.set(entries).await
    }
}

/// Decodes a stored value, reporting malformed data as an encoding error so
/// callers can fall back to defaults.
pub fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, CoreError> {
    serde_json::from_value(value).map_err(|e| {
        StorageError::Encoding {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

pub fn encode<T: Serialize>(key: &str, value: &T) -> Result<Value, CoreError> {
    serde_json::to_value(value).map_err(|e| {
        StorageError::Encoding {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
