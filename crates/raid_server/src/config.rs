//! Configuration management for the raid server.
//!
//! Settings live in a TOML file. A missing file is created with defaults on
//! first start.

use anyhow::{bail, Context, Result};
use raid_coordinator::{CoordinatorConfig, ForfeiturePolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Application configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Coordinator timing and insurance settings
    pub coordinator: CoordinatorSettings,
    /// Where player profiles are stored
    pub profiles: ProfileSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    /// Period of the dedicated worker heartbeat sweep
    pub sweep_interval_ms: u64,
    /// Age after which a silent worker is evicted
    pub heartbeat_timeout_ms: u64,
    pub forfeiture_policy: ForfeiturePolicy,
    /// How often load statistics are logged
    pub stats_interval_secs: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        let defaults = CoordinatorConfig::default();
        Self {
            sweep_interval_ms: defaults.sweep_interval.as_millis() as u64,
            heartbeat_timeout_ms: defaults.heartbeat_timeout.as_millis() as u64,
            forfeiture_policy: defaults.forfeiture_policy,
            stats_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileBackend {
    #[default]
    Json,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSettings {
    pub backend: ProfileBackend,
    /// Directory for `<id>.profile.json` files when using the json backend
    pub directory: String,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            backend: ProfileBackend::Json,
            directory: "profiles".to_string(),
        }
    }
}

impl ProfileSettings {
    pub fn directory_path(&self) -> PathBuf {
        PathBuf::from(&self.directory)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter
    pub level: String,
    /// JSON formatting
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from file, writing the defaults if it does not exist.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                self.logging.level
            );
        }

        if self.coordinator.stats_interval_secs == 0 {
            bail!("stats_interval_secs must be greater than zero");
        }

        if self.profiles.backend == ProfileBackend::Json && self.profiles.directory.is_empty() {
            bail!("Profile directory cannot be empty");
        }

        self.to_coordinator_config().validate()?;
        Ok(())
    }

    pub fn to_coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            sweep_interval: Duration::from_millis(self.coordinator.sweep_interval_ms),
            heartbeat_timeout: Duration::from_millis(self.coordinator.heartbeat_timeout_ms),
            forfeiture_policy: self.coordinator.forfeiture_policy,
        }
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.coordinator.stats_interval_secs)
    }
}
