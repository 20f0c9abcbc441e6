//! Event source backed by the transition journal.
//!
//! The platform's usage tracker appends one [`TransitionRecord`] per line to
//! `events.jsonl`. Each query rescans the file and keeps records inside the
//! window, preserving file order as arrival order.

use std::io::BufReader;
use std::path::PathBuf;

use fs_err as fs;
use tracing::debug;

use gesture_lock_core::{EventSource, LockError, Result, TransitionEvent, TransitionKind};
use gesture_lock_protocol::{parse_transition, TransitionKind as WireKind, MAX_LINE_BYTES};

use crate::lines::{read_bounded_line, BoundedLine};

pub struct JournalEventSource {
    path: PathBuf,
}

impl JournalEventSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl EventSource for JournalEventSource {
    fn query(&self, from_ms: u64, to_ms: u64) -> Result<Vec<TransitionEvent>> {
        let file = fs::File::open(&self.path).map_err(|err| {
            LockError::EventSourceUnavailable(format!("{}: {}", self.path.display(), err))
        })?;

        let mut reader = BufReader::new(file);
        let mut buffer = Vec::new();
        let mut events = Vec::new();
        let mut skipped = 0usize;
        loop {
            let line = read_bounded_line(&mut reader, MAX_LINE_BYTES, &mut buffer).map_err(
                |source| LockError::Io {
                    context: format!("Failed to read {}", self.path.display()),
                    source,
                },
            )?;
            let line = match line {
                None => break,
                Some(BoundedLine::Text(line)) => line,
                Some(BoundedLine::TooLong | BoundedLine::NotUtf8) => {
                    skipped += 1;
                    continue;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record = match parse_transition(line) {
                Ok(record) => record,
                Err(err) => {
                    debug!(error = %err, "Skipping malformed journal line");
                    skipped += 1;
                    continue;
                }
            };
            if record.timestamp_ms < from_ms || record.timestamp_ms > to_ms {
                continue;
            }
            let kind = match record.kind {
                WireKind::Foreground => TransitionKind::Foreground,
                WireKind::Background => TransitionKind::Background,
            };
            events.push(TransitionEvent {
                package: record.package,
                kind,
                timestamp_ms: record.timestamp_ms,
            });
        }

        if skipped > 0 {
            debug!(skipped, path = %self.path.display(), "Journal lines ignored");
        }
        Ok(events)
    }
}
