//! Broker configuration.
//!
//! Values are layered, lowest precedence first:
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. Environment variables prefixed `BROKER_`, with `__` between section and
//!    key (e.g. `BROKER_MODAL__QUIET_INTERVAL_MS=0`)

use crate::error::{BrokerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BROKER";

/// Modal protocol settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalConfig {
    /// Minimum quiet period between closing one modal and opening the next.
    #[serde(default = "default_quiet_interval_ms")]
    pub quiet_interval_ms: u64,

    /// Deadline for waiting on a client answer. Absent means wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,
}

fn default_quiet_interval_ms() -> u64 {
    1500
}

impl Default for ModalConfig {
    fn default() -> Self {
        Self { quiet_interval_ms: default_quiet_interval_ms(), wait_timeout_ms: None }
    }
}

impl ModalConfig {
    /// The quiet interval as a `Duration`.
    #[must_use]
    pub fn quiet_interval(&self) -> Duration {
        Duration::from_millis(self.quiet_interval_ms)
    }

    /// The wait deadline as a `Duration`, if any.
    #[must_use]
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

/// Background dispatch loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Interval between registry scans.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    50
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { tick_interval_ms: default_tick_interval_ms() }
    }
}

impl DispatchConfig {
    /// The tick interval as a `Duration`.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub modal: ModalConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl BrokerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from an optional TOML file and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`Self::load`], but reads variables from `env` instead of the
    /// process environment when given.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(BrokerError::Config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::new(
                &path.to_string_lossy(),
                config::FileFormat::Toml,
            ));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check values that deserialize fine but cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.tick_interval_ms == 0 {
            return Err(BrokerError::Config(
                "dispatch.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.modal.wait_timeout_ms == Some(0) {
            return Err(BrokerError::Config(
                "modal.wait_timeout_ms must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect())
    }

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.modal.quiet_interval(), Duration::from_millis(1500));
        assert_eq!(config.modal.wait_timeout(), None);
        assert_eq!(config.dispatch.tick_interval(), Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = BrokerConfig::from_toml_str("[modal]\nwait_timeout_ms = 30000\n").unwrap();
        assert_eq!(config.modal.quiet_interval_ms, 1500);
        assert_eq!(config.modal.wait_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.dispatch, DispatchConfig::default());
    }

    #[test]
    fn test_zero_tick_rejected() {
        let err = BrokerConfig::from_toml_str("[dispatch]\ntick_interval_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("tick_interval_ms"));
    }

    #[test]
    fn test_zero_wait_timeout_rejected() {
        assert!(BrokerConfig::from_toml_str("[modal]\nwait_timeout_ms = 0\n").is_err());
    }

    #[test]
    fn test_load_without_sources_gives_defaults() {
        let config = BrokerConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config, BrokerConfig::default());
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[modal]\nquiet_interval_ms = 800\n\n[dispatch]\ntick_interval_ms = 20").unwrap();

        let config = BrokerConfig::load_with_env(
            Some(file.path()),
            env(&[("BROKER_MODAL__QUIET_INTERVAL_MS", "0")]),
        )
        .unwrap();

        assert_eq!(config.modal.quiet_interval_ms, 0);
        assert_eq!(config.dispatch.tick_interval_ms, 20);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = BrokerConfig::load_with_env(Some(Path::new("/nonexistent/broker.toml")), env(&[]))
            .unwrap_err();
        assert!(matches!(err, BrokerError::Config(_)));
    }

    #[test]
    fn test_toml_output_omits_absent_timeout() {
        let rendered = BrokerConfig::default().to_toml_string().unwrap();
        assert!(rendered.contains("quiet_interval_ms = 1500"));
        assert!(rendered.contains("tick_interval_ms = 50"));
        assert!(!rendered.contains("wait_timeout_ms"));
    }
}
