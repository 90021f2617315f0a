use anyhow::Result;
use chrono::NaiveDate;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for the stable routines service
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StableRoutinesConfig {
    /// HTTP surface settings
    pub server: ServerConfig,
    /// Document store behaviour
    pub store: StoreConfig,
    /// Schedule expansion settings
    pub schedule: ScheduleConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Access predicate settings
    pub access: AccessConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the REST surface binds to
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum writes per atomic batch commit
    pub batch_limit: usize,
    /// Re-reads attempted after a version conflict before giving up
    pub max_conflict_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            batch_limit: 500,
            max_conflict_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Longest schedule date range accepted, in days
    pub max_range_days: i64,
    /// Region whose public holidays drive `includeHolidays`
    pub holiday_region: String,
    /// Additional dates treated as holidays
    pub extra_holidays: Vec<NaiveDate>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            max_range_days: 366,
            holiday_region: "se".to_string(),
            extra_holidays: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level directive, e.g. `info` or `stable_routines=debug`
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Entries held by each request's predicate cache
    pub predicate_cache_capacity: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            predicate_cache_capacity: 256,
        }
    }
}

impl StableRoutinesConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (stable-routines.toml, or `path` when given)
    /// 3. Environment variables (prefixed with STABLE_ROUTINES_, nested keys split on `__`)
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path));
            }
            None => {
                if Path::new("stable-routines.toml").exists() {
                    builder = builder.add_source(File::with_name("stable-routines"));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("STABLE_ROUTINES")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = StableRoutinesConfig::default();
        assert_eq!(config.store.batch_limit, 500);
        assert_eq!(config.store.max_conflict_retries, 3);
        assert_eq!(config.schedule.max_range_days, 366);
        assert_eq!(config.schedule.holiday_region, "se");
    }

    #[test]
    fn test_file_overrides_defaults_and_saves_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("routines.toml");
        std::fs::write(
            &path,
            "[store]\nbatch_limit = 50\n\n[schedule]\nextra_holidays = [\"2025-12-31\"]\n",
        )
        .unwrap();

        let config = StableRoutinesConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.store.batch_limit, 50);
        assert_eq!(config.store.max_conflict_retries, 3);
        assert_eq!(
            config.schedule.extra_holidays,
            vec![NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()]
        );

        let saved = dir.path().join("saved.toml");
        config.save_to_file(&saved).unwrap();
        let reloaded = StableRoutinesConfig::load_from(Some(&saved)).unwrap();
        assert_eq!(reloaded.store.batch_limit, 50);
    }
}
