//! Session configuration management.
//!
//! This module handles loading and saving the session settings: session
//! duration, refresh threshold and interval, tag length, storage key prefix
//! and the durable tier location.
//!
//! Configuration is stored at `~/.config/storefront-session/config.json`.

use std::path::PathBuf;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application name used for config/data directory paths
const APP_NAME: &str = "storefront-session";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Sessions last 24 hours from issuance.
const DEFAULT_SESSION_DURATION_SECS: u64 = 24 * 60 * 60;

/// Refresh once less than an hour remains.
const DEFAULT_REFRESH_THRESHOLD_SECS: u64 = 60 * 60;

/// Check every 30 minutes.
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30 * 60;

/// Upper bound for every configured duration.
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

pub const DEFAULT_TAG_LENGTH: usize = 16;

/// Shortest tag accepted; below this a random guess gets too cheap.
pub const MIN_TAG_LENGTH: usize = 8;

/// Full base64url length of an HMAC-SHA256 output.
pub const MAX_TAG_LENGTH: usize = 43;

const DEFAULT_KEY_PREFIX: &str = "storefront";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not find {0} directory")]
    MissingDirectory(&'static str),

    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub session_duration_secs: u64,
    pub refresh_threshold_secs: u64,
    pub refresh_interval_secs: u64,
    pub tag_length: usize,
    pub key_prefix: String,
    pub data_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_duration_secs: DEFAULT_SESSION_DURATION_SECS,
            refresh_threshold_secs: DEFAULT_REFRESH_THRESHOLD_SECS,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            tag_length: DEFAULT_TAG_LENGTH,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            data_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let config: Self = serde_json::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_duration_secs == 0 {
            return Err(ConfigError::Invalid("session duration must be positive".into()));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid("refresh interval must be positive".into()));
        }
        for (name, secs) in [
            ("session duration", self.session_duration_secs),
            ("refresh threshold", self.refresh_threshold_secs),
            ("refresh interval", self.refresh_interval_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{} ({}s) exceeds the maximum of {}s",
                    name, secs, MAX_DURATION_SECS
                )));
            }
        }
        if self.refresh_threshold_secs >= self.session_duration_secs {
            return Err(ConfigError::Invalid(format!(
                "refresh threshold ({}s) must be shorter than the session duration ({}s)",
                self.refresh_threshold_secs, self.session_duration_secs
            )));
        }
        if !(MIN_TAG_LENGTH..=MAX_TAG_LENGTH).contains(&self.tag_length) {
            return Err(ConfigError::Invalid(format!(
                "tag length must be between {} and {}, got {}",
                MIN_TAG_LENGTH, MAX_TAG_LENGTH, self.tag_length
            )));
        }
        if self.key_prefix.is_empty() {
            return Err(ConfigError::Invalid("key prefix must not be empty".into()));
        }
        // The prefix becomes part of each slot file name
        if !self
            .key_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::Invalid(format!(
                "key prefix may only contain letters, digits, '_' and '-', got '{}'",
                self.key_prefix
            )));
        }
        Ok(())
    }

    // Accessors clamp to MAX_DURATION_SECS so an unvalidated config cannot panic

    pub fn session_duration(&self) -> Duration {
        Duration::seconds(self.session_duration_secs.min(MAX_DURATION_SECS) as i64)
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::seconds(self.refresh_threshold_secs.min(MAX_DURATION_SECS) as i64)
    }

    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_interval_secs.min(MAX_DURATION_SECS))
    }

    fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::MissingDirectory("config"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the durable storage tier
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir().ok_or(ConfigError::MissingDirectory("data"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
