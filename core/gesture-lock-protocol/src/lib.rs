//! Line protocol types and validation for the gesture-lock daemon.
//!
//! Every message is one JSON object per line. The daemon writes
//! [`AuthenticationRequest`] and [`VerdictNotice`] lines to stdout, reads
//! [`GestureSubmission`] lines from stdin, and tails a journal of
//! [`TransitionRecord`] lines produced by the platform's usage tracker.
//!
//! This crate is shared by the daemon and its clients to prevent schema drift.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_LINE_BYTES: usize = 256 * 1024;
pub const MAX_PACKAGE_LEN: usize = 256;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Daemon → UI
// ─────────────────────────────────────────────────────────────────────────────

/// Asks the challenge UI to show the gesture pad for `package`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthenticationRequest {
    pub protocol_version: u32,
    pub package: String,
    pub label: String,
    pub requested_at: String,
}

impl AuthenticationRequest {
    pub fn new(package: &str, label: &str, requested_at: String) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            package: package.to_string(),
            label: label.to_string(),
            requested_at,
        }
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_version(self.protocol_version)?;
        require_package(&self.package)?;
        if DateTime::parse_from_rfc3339(&self.requested_at).is_err() {
            return Err(ErrorInfo::new(
                "invalid_timestamp",
                "requested_at must be RFC3339",
            ));
        }
        Ok(())
    }
}

/// Outcome of a scored submission, echoed back so the UI can dismiss or retry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VerdictNotice {
    pub protocol_version: u32,
    pub package: String,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub score: Option<f64>,
}

impl VerdictNotice {
    pub fn new(package: &str, accepted: bool, score: Option<f64>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            package: package.to_string(),
            accepted,
            score,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// UI → Daemon
// ─────────────────────────────────────────────────────────────────────────────

/// A gesture drawn on the challenge pad. Each stroke is a list of `[x, y]` points.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GestureSubmission {
    pub protocol_version: u32,
    pub package: String,
    pub strokes: Vec<Vec<[f64; 2]>>,
}

impl GestureSubmission {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_version(self.protocol_version)?;
        require_package(&self.package)?;
        validate_strokes(&self.strokes)
    }
}

pub fn parse_submission(line: &str) -> Result<GestureSubmission, ErrorInfo> {
    if line.len() > MAX_LINE_BYTES {
        return Err(ErrorInfo::new(
            "line_too_large",
            format!("submission exceeds {} bytes", MAX_LINE_BYTES),
        ));
    }
    let submission: GestureSubmission = serde_json::from_str(line).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("submission is invalid JSON: {}", err),
        )
    })?;
    submission.validate()?;
    Ok(submission)
}

/// Standalone gesture file used by enrolment and calibration tooling.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GestureFile {
    pub strokes: Vec<Vec<[f64; 2]>>,
}

pub fn parse_gesture_file(content: &str) -> Result<GestureFile, ErrorInfo> {
    let file: GestureFile = serde_json::from_str(content).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("gesture file is invalid JSON: {}", err),
        )
    })?;
    validate_strokes(&file.strokes)?;
    Ok(file)
}

// ─────────────────────────────────────────────────────────────────────────────
// Platform → Daemon (journal)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Foreground,
    Background,
}

/// One foreground/background transition as appended to the event journal.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TransitionRecord {
    pub package: String,
    pub kind: TransitionKind,
    pub timestamp_ms: u64,
}

pub fn parse_transition(line: &str) -> Result<TransitionRecord, ErrorInfo> {
    let record: TransitionRecord = serde_json::from_str(line).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("transition record is invalid JSON: {}", err),
        )
    })?;
    require_package(&record.package)?;
    Ok(record)
}

fn require_version(version: u32) -> Result<(), ErrorInfo> {
    if version != PROTOCOL_VERSION {
        return Err(ErrorInfo::new(
            "unsupported_version",
            format!(
                "protocol_version {} is not supported (expected {})",
                version, PROTOCOL_VERSION
            ),
        ));
    }
    Ok(())
}

fn require_package(package: &str) -> Result<(), ErrorInfo> {
    if package.trim().is_empty() {
        return Err(ErrorInfo::new("missing_field", "package is required"));
    }
    if package.len() > MAX_PACKAGE_LEN {
        return Err(ErrorInfo::new(
            "invalid_package",
            format!("package must be {} characters or fewer", MAX_PACKAGE_LEN),
        ));
    }
    Ok(())
}

fn validate_strokes(strokes: &[Vec<[f64; 2]>]) -> Result<(), ErrorInfo> {
    if strokes.is_empty() {
        return Err(ErrorInfo::new(
            "invalid_gesture",
            "gesture needs at least one stroke",
        ));
    }
    for stroke in strokes {
        if stroke.len() < 2 {
            return Err(ErrorInfo::new(
                "invalid_gesture",
                "each stroke needs at least two points",
            ));
        }
        if stroke.iter().flatten().any(|value| !value.is_finite()) {
            return Err(ErrorInfo::new(
                "invalid_gesture",
                "stroke coordinates must be finite",
            ));
        }
    }
    Ok(())
}
