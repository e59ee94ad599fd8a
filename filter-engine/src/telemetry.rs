//! Filter telemetry: the bounded log of filtered posts, the per-day counter
//! behind the badge, and summaries over the log.

use crate::clock::Clock;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use storage::{decode, encode, StorageMap, StorageService};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use webtone_core::{Category, CoreError, FilterRecord};

pub const FILTER_LOG_KEY: &str = "filteredPosts";
pub const DAILY_COUNTER_KEY: &str = "filteredToday";
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Newest-first ring of filter records.
#[derive(Debug)]
pub struct FilterLog<S> {
    storage: Arc<S>,
    capacity: usize,
    write_lock: Mutex<()>,
}

impl<S: StorageService> FilterLog<S> {
    pub fn new(storage: Arc<S>, capacity: usize) -> Self {
        Self {
            storage,
            capacity,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn append(&self, record: FilterRecord) -> Result<(), CoreError> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.read_raw().await?;
        records.insert(0, encode(FILTER_LOG_KEY, &record)?);
        records.truncate(self.capacity);

        self.storage
            .set_one(FILTER_LOG_KEY, Value::Array(records))
            .await
    }

    /// Records newest first. Entries that no longer decode are skipped.
    pub async fn records(&self) -> Result<Vec<FilterRecord>, CoreError> {
        let mut records: Vec<FilterRecord> = self
            .read_raw()
            .await?
            .into_iter()
            .filter_map(|raw| decode(FILTER_LOG_KEY, raw).ok())
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    async fn read_raw(&self) -> Result<Vec<Value>, CoreError> {
        match self.storage.get_one(FILTER_LOG_KEY).await? {
            Some(Value::Array(records)) => Ok(records),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => {
                warn!("Discarding malformed filter log: {}", other);
                Ok(Vec::new())
            }
        }
    }
}

/// Count of filtered posts per local calendar day.
#[derive(Debug)]
pub struct DailyCounter<S> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl<S: StorageService> DailyCounter<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Bumps today's count and returns the new value.
    pub async fn increment(&self) -> Result<u64, CoreError> {
        let _guard = self.write_lock.lock().await;
        let key = day_key(self.clock.local_date());

        let mut days = self.read_days().await?;
        let count = days.get(&key).and_then(Value::as_u64).unwrap_or(0) + 1;
        days.insert(key, Value::from(count));

        self.storage
            .set_one(DAILY_COUNTER_KEY, Value::Object(days))
            .await?;
        Ok(count)
    }

    pub async fn today(&self) -> Result<u64, CoreError> {
        let key = day_key(self.clock.local_date());
        let days = self.read_days().await?;
        Ok(days.get(&key).and_then(Value::as_u64).unwrap_or(0))
    }

    /// Drops every day but today. Run once at startup.
    pub async fn prune_to_today(&self) -> Result<u64, CoreError> {
        let _guard = self.write_lock.lock().await;
        let key = day_key(self.clock.local_date());

        let days = self.read_days().await?;
        let count = days.get(&key).and_then(Value::as_u64).unwrap_or(0);
        debug!("Pruning daily counter to {} ({} days stored)", key, days.len());

        let mut next = StorageMap::new();
        next.insert(key, Value::from(count));
        self.storage
            .set_one(DAILY_COUNTER_KEY, Value::Object(next))
            .await?;
        Ok(count)
    }

    async fn read_days(&self) -> Result<StorageMap, CoreError> {
        match self.storage.get_one(DAILY_COUNTER_KEY).await? {
            Some(Value::Object(days)) => Ok(days),
            _ => Ok(StorageMap::new()),
        }
    }
}

/// Storage key for a calendar day, e.g. `2024-6-1`.
pub fn day_key(date: NaiveDate) -> String {
    format!("{}-{}-{}", date.year(), date.month(), date.day())
}

/// Badge label for a daily count. Empty when nothing was filtered.
pub fn badge_text(count: u64) -> String {
    match count {
        0 => String::new(),
        1..=999 => count.to_string(),
        _ => "999+".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSummary {
    pub total: usize,
    pub by_category: BTreeMap<Category, usize>,
}

/// Counts records whose timestamp falls within `[from, to]`, optionally
/// restricted to one category.
pub fn summarize(
    records: &[FilterRecord],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    category: Option<Category>,
) -> FilterSummary {
    let mut by_category: BTreeMap<Category, usize> =
        Category::ALL.into_iter().map(|c| (c, 0)).collect();
    let mut total = 0;

    for record in records.iter().filter(|r| {
        r.timestamp >= from
            && r.timestamp <= to
            && category.map_or(true, |c| r.filter_type == c)
    }) {
        total += 1;
        *by_category.entry(record.filter_type).or_insert(0) += 1;
    }

    FilterSummary { total, by_category }
}
