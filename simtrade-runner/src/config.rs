//! Pipeline configuration loaded from TOML.
//!
//! Every key is optional; missing keys take the defaults below. The CLI
//! overrides individual values with its flags after loading.
//!
//! ```toml
//! store_dir = "data/store"
//! output_dir = "data/export"
//! workers = 4
//! calendar_start = "2005-01-04"
//!
//! [split]
//! version = 2
//! # [[split.targets]] ...
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use simtrade_core::data::{SplitConfig, ValidatorConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the partition store.
    pub store_dir: PathBuf,
    /// Export destination.
    pub output_dir: PathBuf,
    /// Size of the bounded worker pool for per-symbol work.
    pub workers: usize,
    pub calendar_start: Option<NaiveDate>,
    pub calendar_end: Option<NaiveDate>,
    /// Routing override; the built-in routing is used when absent.
    pub split: Option<SplitConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("data/store"),
            output_dir: PathBuf::from("data/export"),
            workers: 4,
            calendar_start: None,
            calendar_end: None,
            split: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if let (Some(start), Some(end)) = (self.calendar_start, self.calendar_end) {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "calendar_start {start} is after calendar_end {end}"
                )));
            }
        }
        if let Some(split) = &self.split {
            split.check().map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            calendar_start: self.calendar_start,
            calendar_end: self.calendar_end,
        }
    }

    pub fn split_config(&self) -> SplitConfig {
        self.split.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simtrade_core::schema::TableKind;

    #[test]
    fn empty_file_gives_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.split_config(), SplitConfig::default_routing());
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let config = PipelineConfig::from_toml(
            r#"
            store_dir = "/srv/store"
            workers = 8
            calendar_start = "2005-01-04"
            "#,
        )
        .unwrap();
        assert_eq!(config.store_dir, PathBuf::from("/srv/store"));
        assert_eq!(config.workers, 8);
        assert_eq!(config.output_dir, PathBuf::from("data/export"));
        assert_eq!(
            config.validator_config().calendar_start,
            NaiveDate::from_ymd_opt(2005, 1, 4)
        );
    }

    #[test]
    fn split_override_is_parsed_and_checked() {
        let config = PipelineConfig::from_toml(
            r#"
            [split]
            version = 2

            [[split.targets]]
            name = "stocks"
            table = "stocks"
            keys = ["date"]
            columns = ["date", "close", "amount"]
            rename = { amount = "money" }
            "#,
        )
        .unwrap();
        let split = config.split_config();
        assert_eq!(split.version, 2);
        assert_eq!(split.targets[0].table, Some(TableKind::DailyBar));

        let bad = PipelineConfig::from_toml(
            r#"
            [split]
            version = 2

            [[split.targets]]
            name = "stocks"
            table = "stocks"
            keys = ["date"]
            columns = ["date", "vwap"]
            "#,
        );
        assert!(matches!(bad, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(PipelineConfig::from_toml("workers = 0").is_err());
        assert!(PipelineConfig::from_toml(
            "calendar_start = \"2024-01-02\"\ncalendar_end = \"2023-01-02\""
        )
        .is_err());
        assert!(matches!(
            PipelineConfig::from_toml("workers = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
