//! Runtime and strategy configuration

use crate::constants::DEFAULT_LOG_FILTER;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Source could not be read or merged
    #[error("config source error: {0}")]
    Source(#[from] config::ConfigError),

    /// A strategy option holds a value of the wrong shape
    #[error("option '{key}' has unexpected type: {source}")]
    InvalidOption {
        /// Option name
        key: String,
        /// Underlying decode error
        source: serde_json::Error,
    },
}

/// Named options handed to a strategy at construction
///
/// The runtime never interprets these; defaults are documented where a
/// strategy reads them via [`StrategyConfig::get_or`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyConfig {
    values: FxHashMap<String, serde_json::Value>,
}

impl StrategyConfig {
    /// Create an empty option set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Insert or replace an option
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Raw option value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Check whether an option is present
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Decode an option, `Ok(None)` if it is absent
    ///
    /// # Errors
    /// Returns an error if the option is present but does not decode as `T`
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.values
            .get(key)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|source| ConfigError::InvalidOption {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Decode an option, falling back to `default` when absent or malformed
    #[must_use]
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.try_get(key).ok().flatten().unwrap_or(default)
    }

    /// Number of options
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no options are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One strategy to instantiate at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyEntry {
    /// Registered strategy name
    pub name: String,
    /// Options passed through to the strategy
    #[serde(default)]
    pub params: StrategyConfig,
}

/// Process configuration for the runtime binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// `tracing` filter directive
    pub log_filter: String,
    /// Reference data file (JSON array of instruments)
    pub instruments_path: Option<PathBuf>,
    /// Feed file (JSON lines)
    pub feed_path: Option<PathBuf>,
    /// Engine clock at startup; the first feed record's time when unset
    pub start_time_ns: Option<u64>,
    /// Advance the clock to this time after the feed is exhausted
    pub end_time_ns: Option<u64>,
    /// Strategies to start
    pub strategies: Vec<StrategyEntry>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            instruments_path: None,
            feed_path: None,
            start_time_ns: None,
            end_time_ns: None,
            strategies: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from file, with `RUNTIME__*` environment overrides
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not match the schema
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("RUNTIME").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    #[case("my_param", 42_i64)]
    #[case("missing", 42_i64)]
    fn test_get_or_defaults(#[case] key: &str, #[case] expected: i64) {
        let cfg = StrategyConfig::new().with("my_param", 42);
        assert_eq!(cfg.get_or(key, 42_i64), expected);
    }

    #[test]
    fn test_get_or_falls_back_on_wrong_type() {
        let cfg = StrategyConfig::new().with("symbol", 17);
        assert_eq!(cfg.get_or("symbol", "RELIANCE".to_string()), "RELIANCE");
        assert!(cfg.try_get::<String>("symbol").is_err());
    }

    #[test]
    fn test_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            r#"
log_filter = "debug"
feed_path = "feed.jsonl"
start_time_ns = 1700000000000000000

[[strategies]]
name = "spread_watcher"
params = {{ symbol = "INFY", my_param = 5 }}
"#
        )?;

        let cfg = RuntimeConfig::from_file(file.path())?;
        assert_eq!(cfg.log_filter, "debug");
        assert_eq!(cfg.feed_path, Some(PathBuf::from("feed.jsonl")));
        assert!(cfg.instruments_path.is_none());
        assert_eq!(cfg.start_time_ns, Some(1_700_000_000_000_000_000));
        assert!(cfg.end_time_ns.is_none());
        assert_eq!(cfg.strategies.len(), 1);

        let params = &cfg.strategies[0].params;
        assert_eq!(params.get_or("symbol", String::new()), "INFY");
        assert_eq!(params.get_or("my_param", 0_i64), 5);
        Ok(())
    }
}
