//! Persisted monitor flags and the autostart decision.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{read_json, write_json_atomic};
use crate::templates::TemplateStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorFlags {
    #[serde(default)]
    pub monitoring_started: bool,
}

impl MonitorFlags {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(read_json(path)?.unwrap_or_default())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

/// Monitoring resumes after a reboot if it was running before or if any
/// gesture has been saved.
pub fn should_autostart(flags: &MonitorFlags, templates: &TemplateStore) -> bool {
    flags.monitoring_started || templates.has_any_templates()
}
