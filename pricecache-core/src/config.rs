//! Catch-up configuration.
//!
//! Stored as TOML. Every field has a default so an empty file (or no file)
//! is a valid configuration; the CLI overrides individual fields from flags.

use crate::data::MAX_BATCH_SYMBOLS;
use crate::engine::FailurePolicy;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default window start when none is configured, in days before today.
///
/// Kept inside the five-year calendar window.
pub const DEFAULT_START_LOOKBACK_DAYS: i64 = 365 * 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatchupConfig {
    /// Directory holding one CSV per symbol.
    pub data_dir: PathBuf,
    /// Desired first date of every cached series. `None` means four years
    /// before today.
    pub start_date: Option<NaiveDate>,
    /// Refreshed first, with the widest period, on every run.
    pub benchmark: String,
    pub batch_size: usize,
    pub failure_policy: FailurePolicy,
    /// `|`-delimited listing used when no symbols are given.
    pub universe_file: PathBuf,
    pub no_options_file: PathBuf,
}

impl Default for CatchupConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/symbols"),
            start_date: None,
            benchmark: "SPY".to_string(),
            batch_size: MAX_BATCH_SYMBOLS,
            failure_policy: FailurePolicy::default(),
            universe_file: PathBuf::from("data/ticker/nasdaqtraded.txt"),
            no_options_file: PathBuf::from("data/ticker/no_options.csv"),
        }
    }
}

impl CatchupConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_BATCH_SYMBOLS).contains(&self.batch_size) {
            return Err(ConfigError::Invalid(format!(
                "batch_size must be between 1 and {MAX_BATCH_SYMBOLS}, got {}",
                self.batch_size
            )));
        }
        if self.benchmark.trim().is_empty() {
            return Err(ConfigError::Invalid("benchmark must not be empty".into()));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }
        Ok(())
    }

    /// Window start for a run on `today`.
    pub fn resolved_start(&self, today: NaiveDate) -> NaiveDate {
        self.start_date
            .unwrap_or(today - Duration::days(DEFAULT_START_LOOKBACK_DAYS))
    }

    /// Benchmark ticker, uppercased.
    pub fn benchmark_symbol(&self) -> String {
        self.benchmark.trim().to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        let config = CatchupConfig::from_toml("").unwrap();
        assert_eq!(config, CatchupConfig::default());
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.benchmark_symbol(), "SPY");
    }

    #[test]
    fn fields_override_defaults() {
        let config = CatchupConfig::from_toml(
            r#"
            data_dir = "/tmp/prices"
            start_date = "2022-01-03"
            benchmark = "qqq"
            batch_size = 25
            failure_policy = "abort_batch"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/prices"));
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2022, 1, 3));
        assert_eq!(config.benchmark_symbol(), "QQQ");
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.failure_policy, FailurePolicy::AbortBatch);
        assert_eq!(
            config.universe_file,
            PathBuf::from("data/ticker/nasdaqtraded.txt")
        );
    }

    #[test]
    fn oversized_batch_is_invalid() {
        let err = CatchupConfig::from_toml("batch_size = 101").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = CatchupConfig::from_toml("batch_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn blank_benchmark_is_invalid() {
        let err = CatchupConfig::from_toml("benchmark = \"  \"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let err = CatchupConfig::from_toml("batch_size = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = CatchupConfig::from_file(Path::new("/nonexistent/pricecache.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn default_start_is_four_years_back() {
        let config = CatchupConfig::default();
        let today = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(
            config.resolved_start(today),
            today - Duration::days(DEFAULT_START_LOOKBACK_DAYS)
        );
    }
}
