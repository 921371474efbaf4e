//! Configuration for the sqlplan CLI
//!
//! Loads configuration from:
//! 1. config.yaml - target dialect, join suffixes, logging
//! 2. .env file - environment overrides (loaded by `main`)
//!
//! Environment variables always override config.yaml values.

use serde::{Deserialize, Serialize};
use sqlplan_ir::Suffixes;
use sqlplan_registry::{Dialect, RegistryError};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid dialect: {0}")]
    Dialect(#[from] RegistryError),
}

/// Target dialect configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialectConfig {
    /// ansi, postgres, mysql or sqlite
    pub name: String,

    /// Set to false to reject window functions even where the dialect has them
    pub window_functions: bool,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self {
            name: "ansi".to_string(),
            window_functions: true,
        }
    }
}

/// Suffixes appended to clashing join columns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    pub suffix_x: String,
    pub suffix_y: String,
}

impl Default for JoinConfig {
    fn default() -> Self {
        let suffixes = Suffixes::default();
        Self {
            suffix_x: suffixes.left,
            suffix_y: suffixes.right,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stderr, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
            output: "stderr".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dialect: DialectConfig,
    pub join: JoinConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults with environment variable overrides, for runs without a file
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("SQLPLAN_DIALECT") {
            self.dialect.name = name;
        }
        if let Ok(enabled) = std::env::var("SQLPLAN_WINDOW_FUNCTIONS") {
            if let Ok(enabled) = enabled.parse() {
                self.dialect.window_functions = enabled;
            }
        }
        if let Ok(suffix) = std::env::var("SQLPLAN_JOIN_SUFFIX_X") {
            self.join.suffix_x = suffix;
        }
        if let Ok(suffix) = std::env::var("SQLPLAN_JOIN_SUFFIX_Y") {
            self.join.suffix_y = suffix;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }
    }

    /// Resolve the configured dialect descriptor
    pub fn dialect(&self) -> Result<Dialect, ConfigError> {
        let dialect = Dialect::by_name(&self.dialect.name)?;
        Ok(if self.dialect.window_functions {
            dialect
        } else {
            dialect.with_window_functions(false)
        })
    }

    pub fn suffixes(&self) -> Suffixes {
        Suffixes::new(self.join.suffix_x.as_str(), self.join.suffix_y.as_str())
    }

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlplan_registry::Capability;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dialect.name, "ansi");
        assert!(config.dialect.window_functions);
        assert_eq!(config.join.suffix_x, "_x");
        assert_eq!(config.join.suffix_y, "_y");
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.output, "stderr");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("dialect:\n  name: mysql\n").unwrap();
        assert_eq!(config.dialect.name, "mysql");
        assert!(config.dialect.window_functions);
        assert_eq!(config.join.suffix_y, "_y");
        assert_eq!(config.logging.format, "compact");
    }

    #[test]
    fn test_dialect_resolution() {
        let mut config = Config::default();
        config.dialect.name = "sqlite".to_string();
        config.dialect.window_functions = false;

        let dialect = config.dialect().unwrap();
        assert_eq!(dialect.name(), "sqlite");
        assert!(!dialect.supports(Capability::WindowFunctions));

        config.dialect.name = "teradata".to_string();
        assert!(matches!(config.dialect(), Err(ConfigError::Dialect(_))));
    }

    #[test]
    fn test_env_var_override() {
        std::env::set_var("SQLPLAN_DIALECT", "postgres");
        std::env::set_var("SQLPLAN_JOIN_SUFFIX_Y", "_right");

        let config_yaml = r#"
dialect:
  name: "ansi"
  window_functions: true
join:
  suffix_x: "_left"
  suffix_y: "_y"
logging:
  level: "info"
  format: "pretty"
  output: "stderr"
  directory: "./logs"
"#;
        let temp_file = std::env::temp_dir().join("sqlplan_test_config.yaml");
        std::fs::write(&temp_file, config_yaml).unwrap();

        let config = Config::load(&temp_file).unwrap();
        assert_eq!(config.dialect.name, "postgres"); // Overridden
        assert_eq!(config.join.suffix_y, "_right"); // Overridden
        assert_eq!(config.suffixes(), Suffixes::new("_left", "_right"));

        std::env::remove_var("SQLPLAN_DIALECT");
        std::env::remove_var("SQLPLAN_JOIN_SUFFIX_Y");
        std::fs::remove_file(temp_file).ok();
    }
}
