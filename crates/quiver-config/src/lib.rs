#![warn(missing_docs)]

//! # quiver-config
//!
//! Configuration loading for the Quiver fluent-query gateway.
//!
//! Supports TOML configuration files with environment variable expansion.
//!
//! ## Example
//!
//! ```toml
//! [instance]
//! url = "https://dev.example.com"
//! token = "${QUIVER_TOKEN}"
//!
//! [limits]
//! max_script_length = 10000
//! test_mode_max_results = 100
//! timeout_secs = 30
//!
//! [screening]
//! extra_blacklist = ['dropDatabase\s*\(']
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Errors from config parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level Quiver configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QuiverConfig {
    /// The instance the gateway talks to.
    pub instance: InstanceSection,

    /// Pipeline limit overrides.
    #[serde(default)]
    pub limits: LimitOverrides,

    /// Security screening overrides.
    #[serde(default)]
    pub screening: ScreeningOverrides,
}

/// Connection settings for the instance.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceSection {
    /// Base URL, e.g. `https://dev.example.com`.
    pub url: String,

    /// Bearer token for the script endpoint.
    pub token: String,
}

/// Pipeline limit overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitOverrides {
    /// Maximum script length in characters.
    #[serde(default)]
    pub max_script_length: Option<usize>,

    /// Default record cap for test-mode runs.
    #[serde(default)]
    pub test_mode_max_results: Option<usize>,

    /// Default remote call timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Security screening overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScreeningOverrides {
    /// Replacement blacklist pattern sources. Replaces the built-in list
    /// wholesale when set.
    #[serde(default)]
    pub blacklist: Option<Vec<String>>,

    /// Extra blacklist pattern sources appended to the active list.
    #[serde(default)]
    pub extra_blacklist: Vec<String>,
}

impl QuiverConfig {
    /// Parse a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: QuiverConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string, expanding `${ENV_VAR}` references.
    pub fn from_toml_with_env(toml_str: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(toml_str);
        Self::from_toml(&expanded)
    }

    /// Load config from a file path, expanding environment variables.
    pub fn from_file_with_env(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_with_env(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.instance.url.starts_with("http://") && !self.instance.url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "instance.url must start with http:// or https://, got '{}'",
                self.instance.url
            )));
        }
        if self.instance.token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "instance.token must not be empty".into(),
            ));
        }
        if self.limits.max_script_length == Some(0) {
            return Err(ConfigError::Invalid(
                "limits.max_script_length must be positive".into(),
            ));
        }
        if self.limits.test_mode_max_results == Some(0) {
            return Err(ConfigError::Invalid(
                "limits.test_mode_max_results must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string using environment variables.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(value) => result.push_str(&value),
                Err(_) => {
                    // Leave the placeholder if env var not found
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}
