//! The authentication-result path.
//!
//! Gestures are scored on whatever thread the challenge UI reports on. The
//! resulting verdict is not written to the session store from there; it is
//! posted as a message to the monitor, which owns session mutation and drains
//! its inbox between poll cycles.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{LockError, Result};
use crate::matcher::{GestureVerifier, Verdict};
use crate::session::SessionStore;
use crate::templates::TemplateStore;
use crate::types::GestureSample;

#[derive(Debug, Clone, PartialEq)]
pub struct AuthVerdict {
    pub package: String,
    pub accepted: bool,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorMessage {
    Verdict(AuthVerdict),
    Shutdown,
}

/// Cloneable handle for posting into the monitor's inbox.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    sender: Sender<MonitorMessage>,
}

impl MonitorHandle {
    pub fn post_verdict(&self, verdict: AuthVerdict) -> Result<()> {
        self.send(MonitorMessage::Verdict(verdict))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(MonitorMessage::Shutdown)
    }

    fn send(&self, message: MonitorMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| LockError::MonitorStopped)
    }
}

pub fn monitor_channel() -> (MonitorHandle, Receiver<MonitorMessage>) {
    let (sender, receiver) = mpsc::channel();
    (MonitorHandle { sender }, receiver)
}

/// Applies a verdict to the session store. Rejections leave it untouched.
pub fn apply_verdict(sessions: &SessionStore, verdict: &AuthVerdict) {
    if verdict.accepted {
        sessions.set_session(&verdict.package, true);
        info!(package = %verdict.package, score = ?verdict.score, "Package unlocked");
    } else {
        debug!(package = %verdict.package, score = ?verdict.score, "Gesture rejected");
    }
}

/// Scores submitted gestures and forwards verdicts to the monitor.
#[derive(Clone)]
pub struct AuthenticationHandler {
    templates: Arc<TemplateStore>,
    verifier: Arc<GestureVerifier>,
    monitor: MonitorHandle,
}

impl AuthenticationHandler {
    pub fn new(
        templates: Arc<TemplateStore>,
        verifier: Arc<GestureVerifier>,
        monitor: MonitorHandle,
    ) -> Self {
        Self {
            templates,
            verifier,
            monitor,
        }
    }

    pub fn submit(&self, package: &str, candidate: &GestureSample) -> Result<AuthVerdict> {
        let verdict = self.verifier.verify(&self.templates, package, candidate);
        let verdict = AuthVerdict {
            package: package.to_string(),
            accepted: matches!(verdict, Verdict::Accept { .. }),
            score: verdict.score(),
        };
        self.monitor.post_verdict(verdict.clone())?;
        Ok(verdict)
    }
}
