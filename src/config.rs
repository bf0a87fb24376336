use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::PathBuf,
    time::Duration,
};

use crate::{
    error::SyncError,
    identity::{UrlPolicy, NEW_TAB_URL},
};

/// Timing constants and identifier policy of one engine. All durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// After startup, snapshots may remove at most one tab at a time for this long.
    pub startup_window_ms: i64,
    /// Debounce of snapshot writes.
    pub write_delay_ms: i64,
    /// Debounce of the settle check, and the interval in which a second load counts as a client
    /// side redirect.
    pub redirect_window_ms: i64,
    /// Delay between two queue steps.
    pub step_delay_ms: i64,
    /// A url closed locally is not recreated from a snapshot for this long.
    pub recreate_window_ms: i64,
    pub recent_purge_interval_ms: i64,
    pub recycle_purge_interval_ms: i64,
    /// Recycled records and records of closed tabs expire without updates for this long.
    pub recycle_expiry_ms: i64,
    /// Opened before removing the last tab in scope.
    pub placeholder_url: String,
    pub ignored_urls: Vec<String>,
    pub ignored_prefixes: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let policy = UrlPolicy::default();
        let recreate_window_ms = 300_000;
        SyncConfig {
            startup_window_ms: 6_000,
            write_delay_ms: 1_500,
            redirect_window_ms: 1_500,
            step_delay_ms: 1_000,
            recreate_window_ms,
            recent_purge_interval_ms: recreate_window_ms * 10,
            recycle_purge_interval_ms: 3_600_000,
            recycle_expiry_ms: 3 * 3_600_000,
            placeholder_url: NEW_TAB_URL.to_string(),
            ignored_urls: policy.ignored_urls,
            ignored_prefixes: policy.ignored_prefixes,
        }
    }
}

impl SyncConfig {
    pub fn from_toml(content: &str) -> Result<SyncConfig, SyncError> {
        let config: SyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, SyncError> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        let durations = [
            ("startup_window_ms", self.startup_window_ms),
            ("write_delay_ms", self.write_delay_ms),
            ("redirect_window_ms", self.redirect_window_ms),
            ("step_delay_ms", self.step_delay_ms),
            ("recreate_window_ms", self.recreate_window_ms),
            ("recent_purge_interval_ms", self.recent_purge_interval_ms),
            ("recycle_purge_interval_ms", self.recycle_purge_interval_ms),
            ("recycle_expiry_ms", self.recycle_expiry_ms),
        ];
        if let Some((name, value)) = durations.iter().find(|(_, value)| *value < 0) {
            return Err(SyncError::Config(format!(
                "{name} must not be negative, got {value}"
            )));
        }
        if self.recent_purge_interval_ms == 0 || self.recycle_purge_interval_ms == 0 {
            return Err(SyncError::Config(
                "purge intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn url_policy(&self) -> UrlPolicy {
        UrlPolicy {
            ignored_urls: self.ignored_urls.clone(),
            ignored_prefixes: self.ignored_prefixes.clone(),
        }
    }

    pub fn write_delay(&self) -> Duration {
        as_duration(self.write_delay_ms)
    }

    pub fn redirect_delay(&self) -> Duration {
        as_duration(self.redirect_window_ms)
    }

    pub fn step_delay(&self) -> Duration {
        as_duration(self.step_delay_ms)
    }

    pub fn recent_purge_interval(&self) -> Duration {
        as_duration(self.recent_purge_interval_ms)
    }

    pub fn recycle_purge_interval(&self) -> Duration {
        as_duration(self.recycle_purge_interval_ms)
    }
}

fn as_duration(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

pub trait ConfigProvider: Send + Sync {
    fn get_config(&self) -> Result<SyncConfig, SyncError>;
    fn set_config(&self, config: &SyncConfig) -> Result<(), SyncError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn get_config(&self) -> Result<SyncConfig, SyncError> {
        tracing::debug!("Attempting to read sync config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using default timings.");
            return Ok(SyncConfig::default());
        }
        let content = read_to_string(&self.path)?;
        SyncConfig::from_toml(&content)
    }

    fn set_config(&self, config: &SyncConfig) -> Result<(), SyncError> {
        tracing::debug!("Attempting to write sync config to: {:?}", &self.path);
        config.validate()?;
        write(&self.path, config.to_toml()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.recent_purge_interval_ms, 3_000_000);
        assert_eq!(config.recycle_expiry_ms, 10_800_000);
        assert_eq!(config.step_delay(), Duration::from_secs(1));
        assert!(config.url_policy().should_ignore(NEW_TAB_URL));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml(
            r#"
            write_delay_ms = 200
            ignored_prefixes = ["about:", "chrome-devtools://"]
            "#,
        )
        .unwrap();
        assert_eq!(config.write_delay_ms, 200);
        assert_eq!(config.startup_window_ms, 6_000);
        assert!(config.url_policy().should_ignore("about:blank"));
    }

    #[test]
    fn test_negative_durations_are_rejected() {
        let err = SyncConfig::from_toml("step_delay_ms = -5").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_provider_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("tabsync.toml"));
        assert_eq!(provider.get_config().unwrap(), SyncConfig::default());
    }

    #[test]
    fn test_provider_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("tabsync.toml"));
        let config = SyncConfig {
            recreate_window_ms: 60_000,
            ..Default::default()
        };
        provider.set_config(&config).unwrap();
        assert_eq!(provider.get_config().unwrap(), config);
    }
}
