//! Service configuration loaded from `finch.toml`.
//!
//! The [`FinchConfig`] struct holds every tunable setting. Fields missing
//! from the file take sensible defaults. `FINCH_CONFIG` names an alternative
//! file and `FINCH_WORKERS` takes precedence over the configured pool size.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::engine::{EngineConfig, RetryConfig};
use crate::error::{FinchError, Result};

/// Default configuration file, looked up in the current directory.
pub const CONFIG_FILE: &str = "finch.toml";

/// Top-level configuration loaded from `finch.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FinchConfig {
    /// Number of jobs executed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Parent of the per-job working directories.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,

    /// Where staged outputs are published.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Public base URL of `output_dir`. Outputs get `file://` locations when unset.
    #[serde(default)]
    pub output_url: Option<String>,

    /// Directory of the persistent job store. Jobs live in memory when unset.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,

    /// Retries of a failed job store call before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Limit for processes that declare no maximum duration.
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
}

fn default_workers() -> usize {
    4
}

fn default_workdir() -> PathBuf {
    std::env::temp_dir().join("finch").join("work")
}

fn default_output_dir() -> PathBuf {
    std::env::temp_dir().join("finch").join("outputs")
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

impl Default for FinchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            workdir: default_workdir(),
            output_dir: default_output_dir(),
            output_url: None,
            store_dir: None,
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            default_timeout_secs: None,
        }
    }
}

impl FinchConfig {
    /// Loads the file named by `FINCH_CONFIG`, else `finch.toml` in the current
    /// directory, else defaults. Environment overrides are applied last.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os("FINCH_CONFIG") {
            Some(path) => Self::load_from(Path::new(&path))?,
            None => {
                let path = Path::new(CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Loads an explicitly named file, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FinchError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: FinchConfig = toml::from_str(&contents)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Applies environment overrides, reading variables through `var`.
    pub fn apply_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = var("FINCH_WORKERS")
            && !raw.is_empty()
        {
            self.workers = raw.parse().map_err(|_| {
                FinchError::Config(format!("FINCH_WORKERS must be a positive integer, got '{raw}'"))
            })?;
        }
        Ok(())
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            workers: self.workers,
            workdir: self.workdir.clone(),
            retry: self.retry(),
            default_timeout: self.default_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = FinchConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay_ms, 100);
        assert!(config.store_dir.is_none());
        assert!(config.output_url.is_none());
        assert!(config.default_timeout_secs.is_none());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            workers = 8
            output_url = "https://example.org/outputs"
            store_dir = "/var/lib/finch/jobs"
            default_timeout_secs = 600
        "#;
        let config: FinchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(
            config.output_url.as_deref(),
            Some("https://example.org/outputs")
        );
        assert_eq!(config.store_dir, Some(PathBuf::from("/var/lib/finch/jobs")));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay_ms, 100);

        let engine = config.engine_config();
        assert_eq!(engine.workers, 8);
        assert_eq!(engine.default_timeout, Some(Duration::from_secs(600)));
        assert_eq!(engine.retry.max_retries, 3);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<FinchConfig>("wokers = 2").is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finch.toml");
        std::fs::write(&path, "max_retries = 5\nbase_delay_ms = 10\n").unwrap();

        let config = FinchConfig::load_from(&path).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry().delay_for_attempt(2), 20);
    }

    #[test]
    fn load_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = FinchConfig::load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, FinchError::Config(_)));
    }

    #[test]
    fn workers_override() {
        let mut config = FinchConfig::default();
        config
            .apply_overrides(|name| (name == "FINCH_WORKERS").then(|| "12".to_string()))
            .unwrap();
        assert_eq!(config.workers, 12);

        let err = config
            .apply_overrides(|_| Some("many".to_string()))
            .unwrap_err();
        assert!(matches!(err, FinchError::Config(_)));
        assert_eq!(config.workers, 12);

        config.apply_overrides(|_| Some(String::new())).unwrap();
        assert_eq!(config.workers, 12);
    }
}
