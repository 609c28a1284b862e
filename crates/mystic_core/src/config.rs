//! Process configuration.
//!
//! Configuration is a JSON file. Loading is lenient: a missing or broken
//! file yields defaults, unknown fields are ignored and missing fields take
//! their default values.

use crate::environment::Environment;
use crate::time::DurationSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the environment variable that overrides the configured environment
pub const ENV_VAR: &str = "MYSTIC_ENV";

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("config io error at {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid configuration JSON
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Mystic configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MysticConfig {
    /// Environment tag handed to new routers
    pub environment: Environment,
    /// Root directory for persisted data
    pub data_dir: PathBuf,
    /// Disk cache directory (derived from `data_dir` when unset)
    pub cache_dir: Option<PathBuf>,
    /// Default cache lifetime
    pub cache_ttl: DurationSpec,
    /// Capacity of the in-memory cache tier
    pub max_cache_size: usize,
    /// Capacity of the snapshot timeline
    pub max_snapshots: usize,
    /// Allow repositioning the timeline cursor
    pub enable_time_travel: bool,
    /// Allow computing snapshot diffs
    pub enable_diffing: bool,
    /// HTTP listen address
    pub bind: String,
}

impl Default for MysticConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            data_dir: PathBuf::from(".mystic"),
            cache_dir: None,
            cache_ttl: DurationSpec::default(),
            max_cache_size: 1000,
            max_snapshots: 1000,
            enable_time_travel: true,
            enable_diffing: true,
            bind: "127.0.0.1:8899".to_string(),
        }
    }
}

impl MysticConfig {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the environment
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Set the data directory
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Set an explicit cache directory
    #[must_use]
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    /// Read configuration from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Read configuration, falling back to defaults on any failure
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "using default configuration");
                Self::default()
            }
        }
    }

    /// Write configuration as pretty JSON, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(io_err)
    }

    /// Apply the `MYSTIC_ENV` override read through `lookup`.
    ///
    /// Unrecognised values are ignored.
    #[must_use]
    pub fn with_env_override<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_VAR) {
            match raw.parse::<Environment>() {
                Ok(environment) => self.environment = environment,
                Err(err) => tracing::warn!(value = %raw, %err, "ignoring {}", ENV_VAR),
            }
        }
        self
    }

    /// Apply the override from the process environment
    #[must_use]
    pub fn with_process_env(self) -> Self {
        self.with_env_override(|key| std::env::var(key).ok())
    }

    /// Resolved disk cache directory
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("cache").join("function_cache"))
    }

    /// Resolved default cache lifetime
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl.resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MysticConfig::default();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.max_cache_size, 1000);
        assert_eq!(config.max_snapshots, 1000);
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.bind, "127.0.0.1:8899");
        assert!(config.enable_time_travel);
        assert!(config.enable_diffing);
    }

    #[test]
    fn test_cache_dir_derived_from_data_dir() {
        let config = MysticConfig::new().with_data_dir("/tmp/m");
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/m/cache/function_cache"));

        let config = config.with_cache_dir("/var/cache/m");
        assert_eq!(config.cache_dir(), PathBuf::from("/var/cache/m"));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"environment": "production", "cache_ttl": "5m", "unknown": 1}"#,
        )
        .unwrap();

        let config = MysticConfig::load(&path);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.max_snapshots, 1000);
    }

    #[test]
    fn test_load_missing_or_broken_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert_eq!(MysticConfig::load(&missing), MysticConfig::default());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(MysticConfig::try_load(&broken).is_err());
        assert_eq!(MysticConfig::load(&broken), MysticConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = MysticConfig::new()
            .with_environment(Environment::Testing)
            .with_cache_dir("/tmp/cache");
        config.save(&path).unwrap();
        assert_eq!(MysticConfig::try_load(&path).unwrap(), config);
    }

    #[test]
    fn test_env_override() {
        let config = MysticConfig::new().with_env_override(|key| {
            (key == ENV_VAR).then(|| "prod".to_string())
        });
        assert_eq!(config.environment, Environment::Production);

        let config = MysticConfig::new().with_env_override(|_| Some("mars".to_string()));
        assert_eq!(config.environment, Environment::Development);

        let config = MysticConfig::new().with_env_override(|_| None);
        assert_eq!(config.environment, Environment::Development);
    }
}
