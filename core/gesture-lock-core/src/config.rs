//! Runtime tunables for the monitor, loaded from `config.toml`.
//!
//! A missing file yields defaults. Every field is optional in the file.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{LockError, Result};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_EVENT_WINDOW_MS: u64 = 4_000;
pub const DEFAULT_REOPEN_WINDOW_MS: u64 = 2_000;
pub const DEFAULT_MIN_SAMPLES: usize = 3;
/// Calibrated against the reference matcher's score scale; see `matcher`.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 2.0;
pub const DEFAULT_SELF_PACKAGE: &str = "gesture-lock";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_event_window_ms")]
    pub event_window_ms: u64,
    #[serde(default = "default_reopen_window_ms")]
    pub reopen_window_ms: u64,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default = "default_self_package")]
    pub self_package: String,
    #[serde(default)]
    pub home_package: Option<String>,
    /// Display labels keyed by package id.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            event_window_ms: DEFAULT_EVENT_WINDOW_MS,
            reopen_window_ms: DEFAULT_REOPEN_WINDOW_MS,
            min_samples: DEFAULT_MIN_SAMPLES,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            self_package: default_self_package(),
            home_package: None,
            labels: HashMap::new(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_event_window_ms() -> u64 {
    DEFAULT_EVENT_WINDOW_MS
}

fn default_reopen_window_ms() -> u64 {
    DEFAULT_REOPEN_WINDOW_MS
}

fn default_min_samples() -> usize {
    DEFAULT_MIN_SAMPLES
}

fn default_match_threshold() -> f64 {
    DEFAULT_MATCH_THRESHOLD
}

fn default_self_package() -> String {
    DEFAULT_SELF_PACKAGE.to_string()
}

impl LockConfig {
    fn validate(&self, path: &Path) -> Result<()> {
        let malformed = |details: &str| LockError::ConfigMalformed {
            path: path.to_path_buf(),
            details: details.to_string(),
        };
        if self.poll_interval_ms == 0 {
            return Err(malformed("poll_interval_ms must be positive"));
        }
        if self.event_window_ms == 0 {
            return Err(malformed("event_window_ms must be positive"));
        }
        if self.min_samples == 0 {
            return Err(malformed("min_samples must be at least 1"));
        }
        if !self.match_threshold.is_finite() {
            return Err(malformed("match_threshold must be finite"));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<LockConfig> {
    if !path.exists() {
        return Ok(LockConfig::default());
    }

    let content = fs_err::read_to_string(path).map_err(|source| LockError::Io {
        context: format!("Failed to read config {}", path.display()),
        source,
    })?;
    let config =
        toml::from_str::<LockConfig>(&content).map_err(|err| LockError::ConfigMalformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;
    config.validate(path)?;
    Ok(config)
}
