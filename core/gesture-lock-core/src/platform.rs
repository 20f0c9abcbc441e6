//! Boundaries to the host platform: environment queries, the challenge UI,
//! and the clock.
//!
//! The engine never talks to the OS directly. Adapters implement these traits;
//! tests substitute fakes.

use std::collections::HashMap;

use chrono::Utc;

/// Environment queries used to decide what may never be challenged.
pub trait Environment: Send + Sync {
    fn is_self_package(&self, package: &str) -> bool;
    /// The launcher / home screen package, if one can be resolved.
    fn home_package(&self) -> Option<String>;
    /// Best-effort human-readable label for a package.
    fn display_label(&self, package: &str) -> Option<String>;
}

/// A request for the challenge UI to show the gesture pad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub package: String,
    pub label: String,
}

/// Fire-and-forget sink for challenge requests. The UI owns the request from
/// here on and reports back through the verdict channel, or never does.
pub trait Authenticator: Send + Sync {
    fn request_authentication(&self, request: &AuthRequest);
}

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Falls back to the raw package id when no label is known.
pub fn resolve_display_label(environment: &dyn Environment, package: &str) -> String {
    environment
        .display_label(package)
        .filter(|label| !label.trim().is_empty())
        .unwrap_or_else(|| package.to_string())
}

/// Environment answered from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    self_package: String,
    home_package: Option<String>,
    labels: HashMap<String, String>,
}

impl StaticEnvironment {
    pub fn new(
        self_package: impl Into<String>,
        home_package: Option<String>,
        labels: HashMap<String, String>,
    ) -> Self {
        Self {
            self_package: self_package.into(),
            home_package,
            labels,
        }
    }
}

impl Environment for StaticEnvironment {
    fn is_self_package(&self, package: &str) -> bool {
        self.self_package == package
    }

    fn home_package(&self) -> Option<String> {
        self.home_package.clone()
    }

    fn display_label(&self, package: &str) -> Option<String> {
        self.labels.get(package).cloned()
    }
}
