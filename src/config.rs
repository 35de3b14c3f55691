//! Harness configuration.
//!
//! Timing and file-naming options shared by the run scheduler and the batch
//! coordinator. Values come from defaults, then `HARNESS_*` environment
//! variables, then CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for a harness session.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Interval between two ticks of the polling state machine.
    pub poll_interval: Duration,
    /// Pause before the first tick of a batch.
    pub start_delay: Duration,
    /// Poll budget for runs that do not declare their own.
    pub default_max_polls: u32,
    /// Whether the process should exit once the last run is verified.
    pub close_on_completion: bool,
    /// Extension of program sources picked up in directory mode.
    pub source_extension: String,
    /// Extension of the per-program log file.
    pub log_extension: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            start_delay: Duration::ZERO,
            default_max_polls: 3,
            close_on_completion: true,
            source_extension: "mas".to_string(),
            log_extension: "log".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `HARNESS_POLL_INTERVAL_MS`: Tick interval in milliseconds (default: 2000)
    /// - `HARNESS_START_DELAY_MS`: Delay before the first tick (default: 0)
    /// - `HARNESS_MAX_POLLS`: Default poll budget per run (default: 3)
    /// - `HARNESS_CLOSE_ON_COMPLETION`: Exit after the last run (default: true)
    /// - `HARNESS_SOURCE_EXT`: Program source extension (default: mas)
    /// - `HARNESS_LOG_EXT`: Log file extension (default: log)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("HARNESS_POLL_INTERVAL_MS") {
            let ms: u64 = parse_env_value(&val, "HARNESS_POLL_INTERVAL_MS")?;
            config.poll_interval = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("HARNESS_START_DELAY_MS") {
            let ms: u64 = parse_env_value(&val, "HARNESS_START_DELAY_MS")?;
            config.start_delay = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("HARNESS_MAX_POLLS") {
            config.default_max_polls = parse_env_value(&val, "HARNESS_MAX_POLLS")?;
        }

        if let Ok(val) = std::env::var("HARNESS_CLOSE_ON_COMPLETION") {
            config.close_on_completion = parse_env_bool(&val, "HARNESS_CLOSE_ON_COMPLETION")?;
        }

        if let Ok(val) = std::env::var("HARNESS_SOURCE_EXT") {
            config.source_extension = val;
        }

        if let Ok(val) = std::env::var("HARNESS_LOG_EXT") {
            config.log_extension = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.default_max_polls == 0 {
            return Err(ConfigError::ValidationFailed(
                "default_max_polls must be greater than 0".to_string(),
            ));
        }

        validate_extension("source_extension", &self.source_extension)?;
        validate_extension("log_extension", &self.log_extension)?;

        Ok(())
    }

    /// Returns the log destination for a program source.
    pub fn log_path_for(&self, source: &Path) -> PathBuf {
        source.with_extension(&self.log_extension)
    }

    /// Approximate wall-clock budget of a run with the given poll budget.
    pub fn run_budget(&self, max_polls: u32) -> Duration {
        self.poll_interval * max_polls
    }

    /// Builder method to set the tick interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builder method to set the delay before the first tick.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Builder method to set the default poll budget.
    pub fn with_default_max_polls(mut self, max_polls: u32) -> Self {
        self.default_max_polls = max_polls;
        self
    }

    /// Builder method to set close-on-completion.
    pub fn with_close_on_completion(mut self, close: bool) -> Self {
        self.close_on_completion = close;
        self
    }

    /// Builder method to set the program source extension.
    pub fn with_source_extension(mut self, ext: impl Into<String>) -> Self {
        self.source_extension = ext.into();
        self
    }

    /// Builder method to set the log file extension.
    pub fn with_log_extension(mut self, ext: impl Into<String>) -> Self {
        self.log_extension = ext.into();
        self
    }
}

fn validate_extension(key: &str, ext: &str) -> Result<(), ConfigError> {
    if ext.is_empty() {
        return Err(ConfigError::ValidationFailed(format!(
            "{} cannot be empty",
            key
        )));
    }
    if ext.starts_with('.') {
        return Err(ConfigError::ValidationFailed(format!(
            "{} must not start with a dot",
            key
        )));
    }
    Ok(())
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(2000));
        assert_eq!(config.start_delay, Duration::ZERO);
        assert_eq!(config.default_max_polls, 3);
        assert!(config.close_on_completion);
        assert_eq!(config.source_extension, "mas");
        assert_eq!(config.log_extension, "log");
    }

    #[test]
    fn test_config_builder() {
        let config = HarnessConfig::new()
            .with_poll_interval(Duration::from_millis(250))
            .with_start_delay(Duration::from_secs(1))
            .with_default_max_polls(10)
            .with_close_on_completion(false)
            .with_source_extension("asm")
            .with_log_extension("txt");

        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.start_delay, Duration::from_secs(1));
        assert_eq!(config.default_max_polls, 10);
        assert!(!config.close_on_completion);
        assert_eq!(config.source_extension, "asm");
        assert_eq!(config.log_extension, "txt");
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(HarnessConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_zero_interval() {
        let config = HarnessConfig::default().with_poll_interval(Duration::ZERO);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("poll_interval"));
    }

    #[test]
    fn test_validation_zero_max_polls() {
        let config = HarnessConfig::default().with_default_max_polls(0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("default_max_polls"));
    }

    #[test]
    fn test_validation_bad_extensions() {
        let config = HarnessConfig::default().with_source_extension("");
        assert!(config.validate().is_err());

        let config = HarnessConfig::default().with_log_extension(".log");
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("log_extension"));
    }

    #[test]
    fn test_log_path_for() {
        let config = HarnessConfig::default();
        assert_eq!(
            config.log_path_for(Path::new("testbed/square.mas")),
            PathBuf::from("testbed/square.log")
        );
    }

    #[test]
    fn test_run_budget() {
        let config = HarnessConfig::default();
        assert_eq!(config.run_budget(3), Duration::from_secs(6));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("yes", "K").unwrap());
        assert!(!parse_env_bool("0", "K").unwrap());
        assert!(parse_env_bool("maybe", "K").is_err());
    }

    #[test]
    fn test_parse_env_value_error() {
        let result: Result<u64, _> = parse_env_value("abc", "HARNESS_MAX_POLLS");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("HARNESS_MAX_POLLS"));
    }
}
