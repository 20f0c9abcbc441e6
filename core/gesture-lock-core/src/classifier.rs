//! Classifies a trailing window of transitions into real exits and the current
//! foreground package.
//!
//! Apps routinely background and re-foreground themselves while the user moves
//! between their own screens. Within one window, a package that comes back to
//! the foreground after going to the background is treated as internal
//! navigation; only a background with no later re-entry is a real exit.
//!
//! The classifier is a pure function of the window: it never touches session
//! state, so running it twice on the same events yields the same summary.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{TransitionEvent, TransitionKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowSummary {
    /// Packages that left the foreground and did not come back within the window.
    pub real_exits: BTreeSet<String>,
    /// Package of the newest foreground event, if the window had one.
    pub foreground: Option<String>,
}

impl WindowSummary {
    pub fn is_empty(&self) -> bool {
        self.real_exits.is_empty() && self.foreground.is_none()
    }
}

pub fn classify_window(events: &[TransitionEvent]) -> WindowSummary {
    WindowSummary {
        real_exits: real_exits(events),
        foreground: latest_foreground(events).map(str::to_string),
    }
}

fn real_exits(events: &[TransitionEvent]) -> BTreeSet<String> {
    let mut by_package: BTreeMap<&str, Vec<&TransitionEvent>> = BTreeMap::new();
    for event in events {
        by_package
            .entry(event.package.as_str())
            .or_default()
            .push(event);
    }

    let mut exits = BTreeSet::new();
    for (package, mut group) in by_package {
        // Stable: equal timestamps keep arrival order.
        group.sort_by_key(|event| event.timestamp_ms);

        let mut saw_background = false;
        let mut internal_navigation = false;
        for event in group {
            match event.kind {
                TransitionKind::Background => saw_background = true,
                TransitionKind::Foreground if saw_background => internal_navigation = true,
                TransitionKind::Foreground => {}
            }
        }

        if saw_background && !internal_navigation {
            exits.insert(package.to_string());
        }
    }
    exits
}

fn latest_foreground(events: &[TransitionEvent]) -> Option<&str> {
    let mut latest: Option<&TransitionEvent> = None;
    for event in events
        .iter()
        .filter(|event| event.kind == TransitionKind::Foreground)
    {
        match latest {
            Some(current) if event.timestamp_ms < current.timestamp_ms => {}
            _ => latest = Some(event),
        }
    }
    latest.map(|event| event.package.as_str())
}
