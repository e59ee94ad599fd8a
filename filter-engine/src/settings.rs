//! Settings store adapter.
//!
//! Reads the user's configuration from the key-value service and normalizes it
//! into [`Settings`]. Loading never fails: any missing or malformed field falls
//! back to its default, and an unreachable store yields the defaults outright.

use crate::clock::Clock;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use storage::{StorageMap, StorageService};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use webtone_core::{Category, CoreError, ErrorRecovery};

pub mod keys {
    pub const IS_ENABLED: &str = "isEnabled";
    pub const BLUR_MODE: &str = "blurMode";
    pub const FILTER_SETTINGS: &str = "filterSettings";
    pub const SENSITIVITY: &str = "sensitivity";
    pub const ALLOW_HANDLES: &str = "allowHandles";
    pub const ALLOW_KEYWORDS: &str = "allowKeywords";
    pub const SNOOZE_UNTIL: &str = "snoozeUntil";
    pub const PER_THRESHOLDS: &str = "perThresholds";
    pub const QH_ENABLED: &str = "qhEnabled";
    pub const QH_START: &str = "qhStart";
    pub const QH_END: &str = "qhEnd";
    pub const DEBUG_MODE: &str = "debugMode";
    pub const CLIENT_ID: &str = "webtone_client_id";

    pub const ALL: [&str; 12] = [
        IS_ENABLED,
        BLUR_MODE,
        FILTER_SETTINGS,
        SENSITIVITY,
        ALLOW_HANDLES,
        ALLOW_KEYWORDS,
        SNOOZE_UNTIL,
        PER_THRESHOLDS,
        QH_ENABLED,
        QH_START,
        QH_END,
        DEBUG_MODE,
    ];
}

pub const DEFAULT_SENSITIVITY: f64 = 0.65;
pub const DEFAULT_QUIET_START: u32 = 22;
pub const DEFAULT_QUIET_END: u32 = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct QuietHours {
    pub enabled: bool,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start_hour: DEFAULT_QUIET_START,
            end_hour: DEFAULT_QUIET_END,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub enabled: bool,
    pub blur_mode: bool,
    pub global_sensitivity: f64,
    pub category_enabled: BTreeMap<Category, bool>,
    /// 0 means unset; the global sensitivity applies.
    pub category_threshold: BTreeMap<Category, f64>,
    /// Lower-cased, blanks removed.
    pub allow_handles: Vec<String>,
    /// Lower-cased, blanks removed.
    pub allow_keywords: Vec<String>,
    pub snooze_until: Option<DateTime<Utc>>,
    pub quiet_hours: QuietHours,
    pub debug_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            blur_mode: false,
            global_sensitivity: DEFAULT_SENSITIVITY,
            category_enabled: default_category_filters(),
            category_threshold: BTreeMap::new(),
            allow_handles: Vec::new(),
            allow_keywords: Vec::new(),
            snooze_until: None,
            quiet_hours: QuietHours::default(),
            debug_mode: false,
        }
    }
}

impl Settings {
    pub fn is_category_enabled(&self, category: Category) -> bool {
        self.category_enabled
            .get(&category)
            .copied()
            .unwrap_or(false)
    }

    pub fn effective_threshold(&self, category: Category) -> f64 {
        match self.category_threshold.get(&category) {
            Some(threshold) if *threshold > 0.0 => *threshold,
            _ => self.global_sensitivity,
        }
    }

    pub fn is_snoozed(&self, now: DateTime<Utc>) -> bool {
        self.snooze_until.is_some_and(|until| now < until)
    }

    /// Builds settings from raw stored values.
    pub fn from_storage(raw: &StorageMap) -> Self {
        let defaults = Settings::default();
        let get = |key: &str| raw.get(key).filter(|v| !v.is_null());

        Self {
            enabled: get(keys::IS_ENABLED).map_or(defaults.enabled, truthy),
            blur_mode: get(keys::BLUR_MODE).is_some_and(truthy),
            global_sensitivity: get(keys::SENSITIVITY)
                .and_then(Value::as_f64)
                .filter(|s| s.is_finite())
                .map_or(defaults.global_sensitivity, |s| s.clamp(0.0, 1.0)),
            category_enabled: get(keys::FILTER_SETTINGS)
                .and_then(Value::as_object)
                .map_or(defaults.category_enabled, |filters| {
                    Category::ALL
                        .into_iter()
                        .map(|c| (c, filters.get(c.as_str()).is_some_and(truthy)))
                        .collect()
                }),
            category_threshold: get(keys::PER_THRESHOLDS)
                .and_then(Value::as_object)
                .map(|thresholds| {
                    Category::ALL
                        .into_iter()
                        .filter_map(|c| {
                            let value = thresholds.get(c.as_str())?.as_f64()?;
                            value.is_finite().then(|| (c, value.clamp(0.0, 1.0)))
                        })
                        .collect()
                })
                .unwrap_or_default(),
            allow_handles: get(keys::ALLOW_HANDLES)
                .map(string_list)
                .unwrap_or_default(),
            allow_keywords: get(keys::ALLOW_KEYWORDS)
                .map(string_list)
                .unwrap_or_default(),
            snooze_until: get(keys::SNOOZE_UNTIL)
                .and_then(Value::as_f64)
                .filter(|ms| ms.is_finite() && *ms > 0.0)
                .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single()),
            quiet_hours: QuietHours {
                enabled: get(keys::QH_ENABLED).is_some_and(truthy),
                start_hour: get(keys::QH_START)
                    .and_then(hour)
                    .unwrap_or(DEFAULT_QUIET_START),
                end_hour: get(keys::QH_END)
                    .and_then(hour)
                    .unwrap_or(DEFAULT_QUIET_END),
            },
            debug_mode: get(keys::DEBUG_MODE).is_some_and(truthy),
        }
    }
}

pub fn default_category_filters() -> BTreeMap<Category, bool> {
    Category::ALL
        .into_iter()
        .map(|c| (c, c == Category::Cynical))
        .collect()
}

/// Loose truthiness for values written by older builds of the popup.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_lowercase()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn hour(value: &Value) -> Option<u32> {
    let raw = value.as_f64()?;
    (raw.fract() == 0.0 && (0.0..=23.0).contains(&raw)).then_some(raw as u32)
}

#[derive(Debug, Clone)]
struct CachedSettings {
    settings: Arc<Settings>,
    loaded_at: DateTime<Utc>,
}

/// Loads settings with a short-lived cache so bursts of scan events do not
/// hammer the storage service.
#[derive(Debug)]
pub struct SettingsService<S> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cached: RwLock<Option<CachedSettings>>,
}

impl<S: StorageService> SettingsService<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            storage,
            clock,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Always reads through to storage and refreshes the cache.
    pub async fn load(&self) -> Arc<Settings> {
        let raw = ErrorRecovery::recover(
            self.storage.get(&keys::ALL).await,
            "load settings",
            StorageMap::new,
        )
        .unwrap_or_else(|| {
            warn!("Settings storage unavailable, using defaults");
            StorageMap::new()
        });

        let settings = Arc::new(Settings::from_storage(&raw));
        debug!("Settings loaded: {:?}", settings);

        *self.cached.write().await = Some(CachedSettings {
            settings: settings.clone(),
            loaded_at: self.clock.now(),
        });
        settings
    }

    pub async fn cached_or_load(&self) -> Arc<Settings> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            let age = self.clock.now() - cached.loaded_at;
            if age.to_std().is_ok_and(|age| age < self.ttl) {
                return cached.settings.clone();
            }
        }
        self.load().await
    }

    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    /// Writes defaults for the keys a fresh install expects to find.
    pub async fn seed_defaults(&self) -> Result<(), CoreError> {
        let existing = self
            .storage
            .get(&[
                keys::IS_ENABLED,
                keys::SENSITIVITY,
                keys::FILTER_SETTINGS,
                keys::ALLOW_HANDLES,
                keys::ALLOW_KEYWORDS,
            ])
            .await?;

        let mut seed = StorageMap::new();
        if !existing.contains_key(keys::IS_ENABLED) {
            seed.insert(keys::IS_ENABLED.to_string(), json!(true));
        }
        if !existing.contains_key(keys::SENSITIVITY) {
            seed.insert(keys::SENSITIVITY.to_string(), json!(DEFAULT_SENSITIVITY));
        }
        if !existing.get(keys::FILTER_SETTINGS).is_some_and(truthy) {
            seed.insert(
                keys::FILTER_SETTINGS.to_string(),
                category_filters_json(&default_category_filters()),
            );
        }
        for key in [keys::ALLOW_HANDLES, keys::ALLOW_KEYWORDS] {
            if !existing.get(key).is_some_and(Value::is_array) {
                seed.insert(key.to_string(), json!([]));
            }
        }

        if seed.is_empty() {
            return Ok(());
        }
        debug!("Seeding default settings: {:?}", seed.keys());
        self.storage.set(seed).await
    }

    /// Returns the persistent anonymous client id, creating it on first use.
    pub async fn client_id(&self) -> String {
        match self.storage.get_one(keys::CLIENT_ID).await {
            Ok(Some(Value::String(id))) if !id.is_empty() => id,
            Ok(_) => {
                let id = uuid::Uuid::new_v4().to_string();
                if let Err(e) = self
                    .storage
                    .set_one(keys::CLIENT_ID, Value::String(id.clone()))
                    .await
                {
                    warn!("Could not persist client id: {}", e);
                }
                id
            }
            Err(e) => {
                warn!("Could not read client id: {}", e);
                "anon".to_string()
            }
        }
    }
}

pub fn category_filters_json(filters: &BTreeMap<Category, bool>) -> Value {
    Value::Object(
        filters
            .iter()
            .map(|(c, on)| (c.as_str().to_string(), Value::Bool(*on)))
            .collect(),
    )
}
