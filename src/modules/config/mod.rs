use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::modules::email::SmtpSettings;
use crate::{
    DEFAULT_TOKEN_BYTES, DEFAULT_TOKEN_TTL_SECS, MAX_TOKEN_BYTES, MAX_TOKEN_TTL_SECS, MIN_TOKEN_BYTES,
};

/// Environment variable overriding `token_ttl_secs`
pub const TTL_ENV_VAR: &str = "RESET_TOKEN_TTL_SECS";
/// Environment variable overriding `token_bytes`
pub const TOKEN_BYTES_ENV_VAR: &str = "RESET_TOKEN_BYTES";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for token issuance and delivery
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ResetConfig {
    /// Lifetime of an issued token in seconds
    pub token_ttl_secs: u64,
    /// Random bytes per token before hex encoding
    pub token_bytes: usize,
    pub smtp: Option<SmtpSettings>,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            token_bytes: DEFAULT_TOKEN_BYTES,
            smtp: None,
        }
    }
}

impl ResetConfig {
    /// Load from a JSON file, falling back to defaults when it does not exist,
    /// then apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Apply overrides from a key lookup (the process environment in `load`)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(TTL_ENV_VAR) {
            self.token_ttl_secs = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{} is not a number: {}", TTL_ENV_VAR, value)))?;
        }
        if let Some(value) = lookup(TOKEN_BYTES_ENV_VAR) {
            self.token_bytes = value.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} is not a number: {}", TOKEN_BYTES_ENV_VAR, value))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_ttl_secs == 0 {
            return Err(ConfigError::Invalid("token_ttl_secs must be positive".to_string()));
        }
        if self.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "token_ttl_secs must not exceed {}",
                MAX_TOKEN_TTL_SECS
            )));
        }
        if !(MIN_TOKEN_BYTES..=MAX_TOKEN_BYTES).contains(&self.token_bytes) {
            return Err(ConfigError::Invalid(format!(
                "token_bytes must be between {} and {}",
                MIN_TOKEN_BYTES, MAX_TOKEN_BYTES
            )));
        }
        Ok(())
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::seconds(self.token_ttl_secs.min(MAX_TOKEN_TTL_SECS) as i64)
    }
}
