//! Settings writers used by the popup and keyboard commands.
//!
//! Each writer persists the new value and returns the [`InboundSignal`] to
//! broadcast to every running engine.

use crate::cache::CACHE_KEY;
use crate::clock::Clock;
use crate::settings::{category_filters_json, keys};
use crate::telemetry::FILTER_LOG_KEY;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use storage::{StorageMap, StorageService};
use tracing::info;
use webtone_core::{Category, CoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundSignal {
    ToggleEnabled { enabled: bool },
    BlurModeChanged,
    FilterSettingsChanged,
    CategoryThresholdsChanged,
    AllowlistChanged,
    SnoozeActivated {
        #[serde(with = "chrono::serde::ts_milliseconds")]
        until: DateTime<Utc>,
    },
    RevealLastRequested,
    DebugModeChanged { enabled: bool },
}

impl InboundSignal {
    /// Signals after which cached settings and processed marks are stale.
    pub fn changes_settings(&self) -> bool {
        !matches!(
            self,
            InboundSignal::RevealLastRequested | InboundSignal::DebugModeChanged { .. }
        )
    }
}

#[derive(Debug)]
pub struct SettingsController<S> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    snooze_default: chrono::Duration,
}

impl<S: StorageService> SettingsController<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>, snooze_default: chrono::Duration) -> Self {
        Self {
            storage,
            clock,
            snooze_default,
        }
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<InboundSignal, CoreError> {
        self.storage
            .set_one(keys::IS_ENABLED, json!(enabled))
            .await?;
        info!("Filtering {}", if enabled { "enabled" } else { "disabled" });
        Ok(InboundSignal::ToggleEnabled { enabled })
    }

    /// Flips the stored flag. A missing flag counts as enabled.
    pub async fn toggle_enabled(&self) -> Result<InboundSignal, CoreError> {
        let current = self
            .storage
            .get_one(keys::IS_ENABLED)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        self.set_enabled(!current).await
    }

    pub async fn set_blur_mode(&self, blur: bool) -> Result<InboundSignal, CoreError> {
        self.storage.set_one(keys::BLUR_MODE, json!(blur)).await?;
        Ok(InboundSignal::BlurModeChanged)
    }

    pub async fn set_sensitivity(&self, sensitivity: f64) -> Result<InboundSignal, CoreError> {
        if !sensitivity.is_finite() {
            return Err(CoreError::InvalidInput {
                message: format!("sensitivity must be a number, got {}", sensitivity),
            });
        }
        self.storage
            .set_one(keys::SENSITIVITY, json!(sensitivity.clamp(0.0, 1.0)))
            .await?;
        Ok(InboundSignal::FilterSettingsChanged)
    }

    pub async fn set_filter_settings(
        &self,
        filters: &BTreeMap<Category, bool>,
    ) -> Result<InboundSignal, CoreError> {
        self.storage
            .set_one(keys::FILTER_SETTINGS, category_filters_json(filters))
            .await?;
        Ok(InboundSignal::FilterSettingsChanged)
    }

    /// Stores a category filter map as received. Anything but a JSON object
    /// is rejected.
    pub async fn set_filter_settings_raw(&self, value: Value) -> Result<InboundSignal, CoreError> {
        if !value.is_object() {
            return Err(CoreError::InvalidInput {
                message: "invalid filterSettings payload".to_string(),
            });
        }
        self.storage.set_one(keys::FILTER_SETTINGS, value).await?;
        Ok(InboundSignal::FilterSettingsChanged)
    }

    /// Replaces every per-category threshold. Zero means "use the global
    /// sensitivity".
    pub async fn set_category_thresholds(
        &self,
        thresholds: &BTreeMap<Category, f64>,
    ) -> Result<InboundSignal, CoreError> {
        let value: StorageMap = thresholds
            .iter()
            .filter(|(_, t)| t.is_finite())
            .map(|(c, t)| (c.as_str().to_string(), json!(t.clamp(0.0, 1.0))))
            .collect();
        self.storage
            .set_one(keys::PER_THRESHOLDS, Value::Object(value))
            .await?;
        Ok(InboundSignal::CategoryThresholdsChanged)
    }

    pub async fn set_allowlist(
        &self,
        handles: &[String],
        keywords: &[String],
    ) -> Result<InboundSignal, CoreError> {
        let mut entries = StorageMap::new();
        entries.insert(keys::ALLOW_HANDLES.to_string(), json!(handles));
        entries.insert(keys::ALLOW_KEYWORDS.to_string(), json!(keywords));
        self.storage.set(entries).await?;
        Ok(InboundSignal::AllowlistChanged)
    }

    /// Pauses filtering for `minutes`, or the configured default.
    pub async fn snooze_for(&self, minutes: Option<u32>) -> Result<InboundSignal, CoreError> {
        let duration = minutes
            .map(|m| chrono::Duration::minutes(i64::from(m)))
            .unwrap_or(self.snooze_default);
        let until = self.clock.now() + duration;

        self.storage
            .set_one(keys::SNOOZE_UNTIL, json!(until.timestamp_millis()))
            .await?;
        info!("Filtering snoozed until {}", until);
        Ok(InboundSignal::SnoozeActivated { until })
    }

    /// Ends any snooze by moving its deadline into the past.
    pub async fn clear_snooze(&self) -> Result<(), CoreError> {
        let until = self.clock.now() - chrono::Duration::milliseconds(1);
        self.storage
            .set_one(keys::SNOOZE_UNTIL, json!(until.timestamp_millis()))
            .await
    }

    pub async fn set_quiet_hours(
        &self,
        enabled: bool,
        start_hour: u32,
        end_hour: u32,
    ) -> Result<(), CoreError> {
        if start_hour > 23 || end_hour > 23 {
            return Err(CoreError::InvalidInput {
                message: format!("quiet hours out of range: {}-{}", start_hour, end_hour),
            });
        }

        let mut entries = StorageMap::new();
        entries.insert(keys::QH_ENABLED.to_string(), json!(enabled));
        entries.insert(keys::QH_START.to_string(), json!(start_hour));
        entries.insert(keys::QH_END.to_string(), json!(end_hour));
        self.storage.set(entries).await
    }

    pub async fn set_debug_mode(&self, enabled: bool) -> Result<InboundSignal, CoreError> {
        self.storage
            .set_one(keys::DEBUG_MODE, json!(enabled))
            .await?;
        Ok(InboundSignal::DebugModeChanged { enabled })
    }

    pub fn request_reveal_last(&self) -> InboundSignal {
        InboundSignal::RevealLastRequested
    }

    /// Empties the classification cache and the filter log.
    pub async fn clear_history(&self) -> Result<(), CoreError> {
        let mut entries = StorageMap::new();
        entries.insert(CACHE_KEY.to_string(), json!({}));
        entries.insert(FILTER_LOG_KEY.to_string(), json!([]));
        self.storage.set(entries).await
    }
}
