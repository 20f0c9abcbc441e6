//! The lock decision for one poll cycle.
//!
//! Each cycle first clears the sessions of every package that really exited,
//! then evaluates the current foreground package `P`:
//!
//! ```text
//! P is self or home          → Skip
//! session for P unlocked     → SessionActive   (throttle := P, now)
//! P throttled < reopen window→ Throttled
//! P not protected            → Skip            (throttle cleared)
//! otherwise                  → Triggered       (challenge, throttle := P, now)
//! ```
//!
//! Only the throttle record survives between cycles. It holds a single package,
//! so it suppresses immediate repeats of the same package, mainly the flicker of
//! the challenge UI itself coming and going.

use tracing::{debug, info};

use crate::classifier::WindowSummary;
use crate::platform::{resolve_display_label, AuthRequest, Authenticator, Environment};
use crate::session::SessionStore;
use crate::templates::TemplateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SelfPackage,
    HomePackage,
    Unprotected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// No foreground event this cycle; the previous foreground stands.
    NoSignal,
    Skip(SkipReason),
    SessionActive,
    Throttled { since_ms: u64 },
    Triggered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cleared: Vec<String>,
    pub foreground: Option<String>,
    pub outcome: GateOutcome,
}

/// The most recently handled package and when it was handled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleRecord {
    pub package: Option<String>,
    pub at_ms: u64,
}

/// Everything a gate evaluation reads or writes besides its own throttle.
pub struct GateContext<'a> {
    pub sessions: &'a SessionStore,
    pub templates: &'a TemplateStore,
    pub environment: &'a dyn Environment,
    pub authenticator: &'a dyn Authenticator,
}

#[derive(Debug)]
pub struct LockGate {
    reopen_window_ms: u64,
    throttle: ThrottleRecord,
}

impl LockGate {
    pub fn new(reopen_window_ms: u64) -> Self {
        Self {
            reopen_window_ms,
            throttle: ThrottleRecord::default(),
        }
    }

    pub fn throttle(&self) -> &ThrottleRecord {
        &self.throttle
    }

    pub fn evaluate(
        &mut self,
        summary: &WindowSummary,
        now_ms: u64,
        ctx: &GateContext<'_>,
    ) -> CycleReport {
        let mut cleared = Vec::with_capacity(summary.real_exits.len());
        for package in &summary.real_exits {
            ctx.sessions.clear_session(package);
            debug!(package = %package, "Cleared session (real exit)");
            cleared.push(package.clone());
        }

        let outcome = match summary.foreground.as_deref() {
            Some(package) => self.evaluate_foreground(package, now_ms, ctx),
            None => GateOutcome::NoSignal,
        };

        CycleReport {
            cleared,
            foreground: summary.foreground.clone(),
            outcome,
        }
    }

    fn evaluate_foreground(
        &mut self,
        package: &str,
        now_ms: u64,
        ctx: &GateContext<'_>,
    ) -> GateOutcome {
        if ctx.environment.is_self_package(package) {
            debug!(package = %package, "Ignoring own package");
            return GateOutcome::Skip(SkipReason::SelfPackage);
        }
        if ctx.environment.home_package().as_deref() == Some(package) {
            debug!(package = %package, "Ignoring home package");
            return GateOutcome::Skip(SkipReason::HomePackage);
        }

        if ctx.sessions.is_unlocked(package) {
            self.record(package, now_ms);
            debug!(package = %package, "Session unlocked; no challenge");
            return GateOutcome::SessionActive;
        }

        if self.throttle.package.as_deref() == Some(package) {
            let since_ms = now_ms.saturating_sub(self.throttle.at_ms);
            if since_ms < self.reopen_window_ms {
                debug!(package = %package, since_ms, "Throttling re-open");
                return GateOutcome::Throttled { since_ms };
            }
        }

        if !ctx.templates.is_protected(package) {
            self.throttle = ThrottleRecord::default();
            return GateOutcome::Skip(SkipReason::Unprotected);
        }

        let request = AuthRequest {
            package: package.to_string(),
            label: resolve_display_label(ctx.environment, package),
        };
        ctx.authenticator.request_authentication(&request);
        self.record(package, now_ms);
        info!(package = %package, label = %request.label, "Challenge requested");
        GateOutcome::Triggered
    }

    fn record(&mut self, package: &str, now_ms: u64) {
        self.throttle = ThrottleRecord {
            package: Some(package.to_string()),
            at_ms: now_ms,
        };
    }
}
