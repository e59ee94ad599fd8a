use crate::{ConfigError, CoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const PRO_KEY_ENV: &str = "WEBTONE_PRO_KEY";
pub const DATABASE_URL_ENV: &str = "WEBTONE_DATABASE_URL";

/// One year.
pub const MAX_CACHE_TTL_HOURS: u64 = 24 * 365;
/// One week.
pub const MAX_SNOOZE_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub classifier: ClassifierConfig,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub score_url: String,
    pub feedback_url: String,
    pub timeout_secs: u64,
    /// Optional bearer token for the paid tier.
    pub pro_key: Option<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            score_url: "https://webtone-proxy.webtone-mudit.workers.dev/score".to_string(),
            feedback_url: "https://webtone-proxy.webtone-mudit.workers.dev/feedback".to_string(),
            timeout_secs: 30,
            pro_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://webtone.db?mode=rwc".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub settings_ttl_ms: u64,
    pub cache_ttl_hours: u64,
    pub filter_log_capacity: usize,
    pub feedback_ack_ms: u64,
    pub snooze_minutes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settings_ttl_ms: 1500,
            cache_ttl_hours: 24,
            filter_log_capacity: 500,
            feedback_ack_ms: 1500,
            snooze_minutes: 10,
        }
    }
}

impl EngineConfig {
    pub fn settings_ttl(&self) -> Duration {
        Duration::from_millis(self.settings_ttl_ms)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours.min(MAX_CACHE_TTL_HOURS) as i64)
    }

    pub fn feedback_ack(&self) -> Duration {
        Duration::from_millis(self.feedback_ack_ms)
    }

    pub fn snooze(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.snooze_minutes.min(MAX_SNOOZE_MINUTES) as i64)
    }
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, CoreError> {
        let config: AppConfig = toml::from_str(raw).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the file, applies environment overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let raw = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&raw).map_err(ConfigError::from)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(PRO_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.classifier.pro_key = Some(key);
        }
        if let Some(url) = lookup(DATABASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.storage.database_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("classifier.score_url", &self.classifier.score_url),
            ("classifier.feedback_url", &self.classifier.feedback_url),
            ("storage.database_url", &self.storage.database_url),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.clone(),
                });
            }
        }

        if self.engine.filter_log_capacity == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "engine.filter_log_capacity must be greater than zero".to_string(),
            });
        }
        for (field, value, max) in [
            (
                "engine.cache_ttl_hours",
                self.engine.cache_ttl_hours,
                MAX_CACHE_TTL_HOURS,
            ),
            (
                "engine.snooze_minutes",
                self.engine.snooze_minutes,
                MAX_SNOOZE_MINUTES,
            ),
        ] {
            if value == 0 || value > max {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{} (expected 1..={})", value, max),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_extension_constants() {
        let config = AppConfig::default();
        assert_eq!(config.engine.settings_ttl(), Duration::from_millis(1500));
        assert_eq!(config.engine.cache_ttl(), chrono::Duration::hours(24));
        assert_eq!(config.engine.filter_log_capacity, 500);
        assert_eq!(config.engine.snooze(), chrono::Duration::minutes(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [classifier]
            score_url = "http://localhost:8787/score"

            [engine]
            filter_log_capacity = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.classifier.score_url, "http://localhost:8787/score");
        assert_eq!(config.classifier.timeout_secs, 30);
        assert_eq!(config.engine.filter_log_capacity, 50);
        assert_eq!(config.engine.settings_ttl_ms, 1500);
    }

    #[test]
    fn test_empty_url_is_rejected() {
        let result = AppConfig::from_toml_str(
            r#"
            [classifier]
            feedback_url = ""
            "#,
        );
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_out_of_range_durations_are_rejected() {
        let result = AppConfig::from_toml_str("[engine]\ncache_ttl_hours = 10000000000000");
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::InvalidValue { ref field, .. }))
                if field == "engine.cache_ttl_hours"
        ));

        let result = AppConfig::from_toml_str("[engine]\nsnooze_minutes = 0");
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::InvalidValue { ref field, .. }))
                if field == "engine.snooze_minutes"
        ));

        let mut config = AppConfig::default();
        config.engine.cache_ttl_hours = u64::MAX;
        config.engine.snooze_minutes = u64::MAX;
        assert_eq!(
            config.engine.cache_ttl(),
            chrono::Duration::hours(MAX_CACHE_TTL_HOURS as i64)
        );
        assert_eq!(
            config.engine.snooze(),
            chrono::Duration::minutes(MAX_SNOOZE_MINUTES as i64)
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(|name| match name {
            PRO_KEY_ENV => Some("secret".to_string()),
            DATABASE_URL_ENV => Some("sqlite::memory:".to_string()),
            _ => None,
        });

        assert_eq!(config.classifier.pro_key.as_deref(), Some("secret"));
        assert_eq!(config.storage.database_url, "sqlite::memory:");
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::load("/nonexistent/webtone.toml");
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::FileNotFound { .. }))
        ));
    }
}
