//! Storage path management for gesture-lock.
//!
//! Every file the daemon reads or writes is named here so that tests can point
//! the whole tree at a temp directory with [`StorageConfig::with_root`].

use std::path::{Path, PathBuf};

use fs_err as fs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{LockError, Result};

const ROOT_DIR_NAME: &str = ".gesture-lock";

/// Central configuration for all gesture-lock storage paths.
///
/// Production code uses [`StorageConfig::resolve`] which points to `~/.gesture-lock/`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    pub fn resolve() -> Result<Self> {
        let home = dirs::home_dir().ok_or(LockError::HomeDirNotFound)?;
        Ok(Self {
            root: home.join(ROOT_DIR_NAME),
        })
    }

    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Path to config.toml (tunables, labels).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path to gestures.json (template library blob keyed by package).
    pub fn templates_file(&self) -> PathBuf {
        self.root.join("gestures.json")
    }

    /// Path to enrolled.json (the "has gesture" flag per package).
    pub fn enrolled_file(&self) -> PathBuf {
        self.root.join("enrolled.json")
    }

    /// Path to monitor.json (monitor flags such as `monitoring_started`).
    pub fn monitor_flags_file(&self) -> PathBuf {
        self.root.join("monitor.json")
    }

    /// Path to the transition journal appended by the platform usage tracker.
    pub fn events_journal(&self) -> PathBuf {
        self.root.join("events.jsonl")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

/// Reads a JSON document. A missing or blank file yields `None`.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LockError::Io {
                context: format!("Failed to read {}", path.display()),
                source,
            })
        }
    };
    if content.trim().is_empty() {
        warn!(path = %path.display(), "Empty store file, treating as absent");
        return Ok(None);
    }
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| LockError::Json {
            context: format!("Failed to parse {}", path.display()),
            source,
        })
}

pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let io_err = |context: &str, source: std::io::Error| LockError::Io {
        context: format!("{} {}", context, path.display()),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| io_err("Failed to create dir for", err))?;
    }
    let payload = serde_json::to_vec(value).map_err(|source| LockError::Json {
        context: format!("Failed to serialize {}", path.display()),
        source,
    })?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload).map_err(|err| io_err("Failed to write", err))?;
    fs::rename(&tmp_path, path).map_err(|err| io_err("Failed to commit", err))?;
    Ok(())
}
