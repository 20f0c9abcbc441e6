//! Drives the event source, classifier and lock gate on a fixed cadence.
//!
//! One cycle runs at a time. The next tick is scheduled after the current
//! cycle finishes, so a slow cycle delays the cadence instead of overlapping.
//! While waiting for the next tick the monitor drains its inbox, which is the
//! only place verdicts from the authentication path touch the session store.
//!
//! Each cycle starts by picking up template changes written by other
//! processes, so a package whose protection was removed stops being gated and
//! loses its session.
//!
//! Failures inside a cycle are logged and degrade that cycle only. An event
//! source that errors is treated as "no events this cycle".

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::auth::{apply_verdict, monitor_channel, MonitorHandle, MonitorMessage};
use crate::classifier::classify_window;
use crate::config::LockConfig;
use crate::error::Result;
use crate::gate::{CycleReport, GateContext, LockGate};
use crate::platform::{Authenticator, Clock, Environment};
use crate::protection::sync_protection;
use crate::session::SessionStore;
use crate::templates::TemplateStore;
use crate::types::TransitionEvent;

/// Source of raw foreground/background transitions.
pub trait EventSource: Send {
    /// Events with `from_ms <= timestamp_ms <= to_ms`, in arrival order.
    fn query(&self, from_ms: u64, to_ms: u64) -> Result<Vec<TransitionEvent>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval_ms: u64,
    pub event_window_ms: u64,
    pub reopen_window_ms: u64,
}

impl From<&LockConfig> for MonitorSettings {
    fn from(config: &LockConfig) -> Self {
        Self {
            poll_interval_ms: config.poll_interval_ms,
            event_window_ms: config.event_window_ms,
            reopen_window_ms: config.reopen_window_ms,
        }
    }
}

/// Shared collaborators the monitor reads and writes.
#[derive(Clone)]
pub struct MonitorDeps {
    pub sessions: Arc<SessionStore>,
    pub templates: Arc<TemplateStore>,
    pub environment: Arc<dyn Environment>,
    pub authenticator: Arc<dyn Authenticator>,
    pub clock: Arc<dyn Clock>,
}

pub struct Monitor<S: EventSource> {
    source: S,
    deps: MonitorDeps,
    settings: MonitorSettings,
    gate: LockGate,
    inbox: Receiver<MonitorMessage>,
    cycles: u64,
}

impl<S: EventSource> Monitor<S> {
    pub fn new(source: S, deps: MonitorDeps, settings: MonitorSettings) -> (Self, MonitorHandle) {
        let (handle, inbox) = monitor_channel();
        let monitor = Self {
            source,
            deps,
            gate: LockGate::new(settings.reopen_window_ms),
            settings,
            inbox,
            cycles: 0,
        };
        (monitor, handle)
    }

    /// Runs a single poll cycle against the current clock.
    pub fn poll_once(&mut self) -> CycleReport {
        if let Err(err) = sync_protection(&self.deps.templates, &self.deps.sessions) {
            warn!(error = %err, "Template reload failed; keeping previous templates");
        }

        let now_ms = self.deps.clock.now_ms();
        let from_ms = now_ms.saturating_sub(self.settings.event_window_ms);
        let events = match self.source.query(from_ms, now_ms) {
            Ok(events) => events,
            Err(err) => {
                warn!(error = %err, "Event query failed; skipping cycle");
                Vec::new()
            }
        };

        let summary = classify_window(&events);
        let ctx = GateContext {
            sessions: &self.deps.sessions,
            templates: &self.deps.templates,
            environment: &*self.deps.environment,
            authenticator: &*self.deps.authenticator,
        };
        let report = self.gate.evaluate(&summary, now_ms, &ctx);
        self.cycles = self.cycles.wrapping_add(1);

        if !summary.is_empty() {
            debug!(
                cycle = self.cycles,
                events = events.len(),
                foreground = ?report.foreground,
                cleared = ?report.cleared,
                outcome = ?report.outcome,
                "Poll cycle"
            );
        }
        report
    }

    /// Applies every message already queued. Returns `false` on shutdown.
    pub fn drain_inbox(&mut self) -> bool {
        while let Ok(message) = self.inbox.try_recv() {
            if !self.handle_message(message) {
                return false;
            }
        }
        true
    }

    fn handle_message(&mut self, message: MonitorMessage) -> bool {
        match message {
            MonitorMessage::Verdict(verdict) => {
                apply_verdict(&self.deps.sessions, &verdict);
                true
            }
            MonitorMessage::Shutdown => false,
        }
    }

    /// Polls until a shutdown message arrives.
    pub fn run(&mut self) {
        info!(
            poll_interval_ms = self.settings.poll_interval_ms,
            event_window_ms = self.settings.event_window_ms,
            reopen_window_ms = self.settings.reopen_window_ms,
            "Monitor started"
        );
        let interval = Duration::from_millis(self.settings.poll_interval_ms);

        loop {
            if !self.drain_inbox() {
                break;
            }
            self.poll_once();
            if !self.wait_for_next_tick(Instant::now() + interval) {
                break;
            }
        }
        info!(cycles = self.cycles, "Monitor stopped");
    }

    fn wait_for_next_tick(&mut self, deadline: Instant) -> bool {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            match self.inbox.recv_timeout(remaining) {
                Ok(message) => {
                    if !self.handle_message(message) {
                        return false;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return true,
                // Every handle is gone; keep the cadence with a plain sleep.
                Err(RecvTimeoutError::Disconnected) => {
                    thread::sleep(remaining);
                    return true;
                }
            }
        }
    }
}
