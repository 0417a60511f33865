//! Scene configuration
//!
//! Consolidates the tunables of the scene-graph core into a single
//! serializable structure with sensible defaults. Configuration files use
//! TOML and are loaded through [`SceneConfig::from_file`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors produced while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A configuration value is out of range
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Configuration for the scene-graph core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Interval in seconds between fixed update steps
    pub fixed_time_step: f32,

    /// Queued-destroy count above which a warning is logged once per flush
    pub destroy_queue_warn_threshold: usize,

    /// Enable per-frame statistics collection
    pub enable_stats: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            fixed_time_step: 1.0 / 60.0,
            destroy_queue_warn_threshold: 1024,
            enable_stats: true,
        }
    }
}

impl SceneConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check configuration values for consistency
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fixed_time_step <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "fixed_time_step must be positive, got {}",
                self.fixed_time_step
            )));
        }
        if self.destroy_queue_warn_threshold == 0 {
            return Err(ConfigError::Invalid(
                "destroy_queue_warn_threshold must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SceneConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.fixed_time_step > 0.0);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: SceneConfig = toml::from_str("fixed_time_step = 0.02").unwrap();
        assert!((config.fixed_time_step - 0.02).abs() < 1e-6);
        // Unspecified fields fall back to defaults
        assert_eq!(
            config.destroy_queue_warn_threshold,
            SceneConfig::default().destroy_queue_warn_threshold
        );
    }

    #[test]
    fn test_invalid_time_step_rejected() {
        let config = SceneConfig {
            fixed_time_step: 0.0,
            ..SceneConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
