//! # gesture-lock-core
//!
//! Decision engine for a gesture-gated app lock.
//!
//! A [`Monitor`] polls an [`EventSource`] for foreground/background transitions,
//! reduces each window to a [`WindowSummary`] and hands it to the [`LockGate`],
//! which decides whether the foreground package needs a gesture challenge.
//! Submitted gestures are scored by a [`GestureVerifier`] and the verdict is
//! posted back to the monitor, which alone mutates the [`SessionStore`].
//!
//! ## Design Principles
//!
//! - **Synchronous**: one monitor thread plus `std::sync::mpsc`; no async runtime.
//! - **Platform at the edges**: OS queries, the challenge UI and the clock sit
//!   behind traits in [`platform`] and [`monitor`].
//! - **Fail open on removal, closed on verification**: a storage fault never
//!   leaves an app locked, and a missing template never unlocks one.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gesture_lock_core::*;
//!
//! let storage = StorageConfig::resolve()?;
//! let config = load_config(&storage.config_file())?;
//! let (mut monitor, handle) = Monitor::new(source, deps, MonitorSettings::from(&config));
//! monitor.run();
//! ```

pub mod auth;
pub mod classifier;
pub mod config;
pub mod error;
pub mod flags;
pub mod gate;
pub mod matcher;
pub mod monitor;
pub mod platform;
pub mod protection;
pub mod session;
pub mod storage;
pub mod templates;
pub mod types;

pub use auth::{apply_verdict, AuthVerdict, AuthenticationHandler, MonitorHandle, MonitorMessage};
pub use classifier::{classify_window, WindowSummary};
pub use config::*;
pub use error::{LockError, Result};
pub use flags::{should_autostart, MonitorFlags};
pub use gate::{CycleReport, GateContext, GateOutcome, LockGate, SkipReason, ThrottleRecord};
pub use matcher::{decide, GestureMatcher, GestureVerifier, ResampledPathMatcher, Verdict};
pub use monitor::{EventSource, Monitor, MonitorDeps, MonitorSettings};
pub use platform::*;
pub use protection::{disable_protection, sync_protection};
pub use session::SessionStore;
pub use storage::StorageConfig;
pub use templates::{
    EnrollmentProgress, JsonFileBackend, MemoryBackend, StoreStamp, TemplateBackend,
    TemplateLibrary, TemplateStore,
};
pub use types::*;
