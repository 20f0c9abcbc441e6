//! Shared data types for the decision engine.

use serde::{Deserialize, Serialize};

use crate::error::{LockError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Foreground,
    Background,
}

/// A single foreground/background transition reported by the event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub package: String,
    pub kind: TransitionKind,
    /// Milliseconds on the event source's clock.
    pub timestamp_ms: u64,
}

impl TransitionEvent {
    pub fn foreground(package: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            package: package.into(),
            kind: TransitionKind::Foreground,
            timestamp_ms,
        }
    }

    pub fn background(package: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            package: package.into(),
            kind: TransitionKind::Background,
            timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One drawn gesture: an ordered list of strokes, each an ordered list of points.
///
/// Deserialisation goes through [`GestureSample::new`], so stored samples are
/// held to the same rules as freshly drawn ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGestureSample")]
pub struct GestureSample {
    strokes: Vec<Vec<Point>>,
}

#[derive(Deserialize)]
struct RawGestureSample {
    strokes: Vec<Vec<Point>>,
}

impl TryFrom<RawGestureSample> for GestureSample {
    type Error = LockError;

    fn try_from(raw: RawGestureSample) -> Result<Self> {
        Self::new(raw.strokes)
    }
}

impl GestureSample {
    pub fn new(strokes: Vec<Vec<Point>>) -> Result<Self> {
        if strokes.is_empty() {
            return Err(LockError::InvalidGesture(
                "gesture needs at least one stroke".to_string(),
            ));
        }
        for stroke in &strokes {
            if stroke.len() < 2 {
                return Err(LockError::InvalidGesture(
                    "each stroke needs at least two points".to_string(),
                ));
            }
            if stroke
                .iter()
                .any(|point| !point.x.is_finite() || !point.y.is_finite())
            {
                return Err(LockError::InvalidGesture(
                    "stroke coordinates must be finite".to_string(),
                ));
            }
        }
        Ok(Self { strokes })
    }

    pub fn from_pairs(strokes: &[Vec<[f64; 2]>]) -> Result<Self> {
        Self::new(
            strokes
                .iter()
                .map(|stroke| stroke.iter().map(|[x, y]| Point::new(*x, *y)).collect())
                .collect(),
        )
    }

    pub fn strokes(&self) -> &[Vec<Point>] {
        &self.strokes
    }
}

/// Score of a candidate gesture against one stored template.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub candidate_owner: String,
    pub score: f64,
}
