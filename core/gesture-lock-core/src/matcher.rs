//! Gesture scoring and the accept/reject decision around it.
//!
//! Scoring sits behind [`GestureMatcher`] so any algorithm can be plugged in.
//! The decision is fixed: take the best score among templates owned by the
//! target package and accept iff it reaches the threshold. No matching template
//! means reject (verification fails closed).
//!
//! [`ResampledPathMatcher`] is the bundled scorer. Its scores are `1 / angle`
//! between normalised path vectors, so the default threshold of 2.0 accepts
//! paths within roughly 0.5 rad of a stored sample. The threshold has no
//! meaning for other matchers and must be recalibrated when swapping scorers;
//! `gesture-lock verify` prints raw scores for that purpose.

use std::cmp::Ordering;

use crate::templates::{TemplateLibrary, TemplateStore};
use crate::types::{GestureSample, MatchResult, Point};

pub trait GestureMatcher: Send + Sync {
    /// Scores `candidate` against every stored sample of every package.
    /// Higher is better. Results are ordered best first.
    fn score(&self, candidate: &GestureSample, library: &TemplateLibrary) -> Vec<MatchResult>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Accept { score: f64 },
    Reject { best_score: Option<f64> },
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept { .. })
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            Verdict::Accept { score } => Some(*score),
            Verdict::Reject { best_score } => *best_score,
        }
    }
}

/// Picks the best result owned by `target` and compares it to `threshold`.
pub fn decide(results: &[MatchResult], target: &str, threshold: f64) -> Verdict {
    let best = results
        .iter()
        .filter(|result| result.candidate_owner == target)
        .map(|result| result.score)
        .filter(|score| !score.is_nan())
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    match best {
        Some(score) if score >= threshold => Verdict::Accept { score },
        best_score => Verdict::Reject { best_score },
    }
}

/// Couples a matcher with the acceptance threshold.
pub struct GestureVerifier {
    matcher: Box<dyn GestureMatcher>,
    threshold: f64,
}

impl GestureVerifier {
    pub fn new(matcher: Box<dyn GestureMatcher>, threshold: f64) -> Self {
        Self { matcher, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn score_all(&self, templates: &TemplateStore, candidate: &GestureSample) -> Vec<MatchResult> {
        templates.with_library(|library| self.matcher.score(candidate, library))
    }

    pub fn verify(
        &self,
        templates: &TemplateStore,
        target: &str,
        candidate: &GestureSample,
    ) -> Verdict {
        decide(&self.score_all(templates, candidate), target, self.threshold)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Reference scorer
// ═══════════════════════════════════════════════════════════════════════════════

const DEFAULT_POINTS_PER_STROKE: usize = 16;
const MAX_SCORE: f64 = 1_000.0;

/// Resamples each stroke to a fixed number of equidistant points, centres the
/// whole gesture on its centroid, scales it to unit length and compares by
/// cosine angle. Stroke order and direction matter; position and size do not.
#[derive(Debug, Clone)]
pub struct ResampledPathMatcher {
    points_per_stroke: usize,
}

impl Default for ResampledPathMatcher {
    fn default() -> Self {
        Self {
            points_per_stroke: DEFAULT_POINTS_PER_STROKE,
        }
    }
}

impl ResampledPathMatcher {
    pub fn new(points_per_stroke: usize) -> Self {
        Self {
            points_per_stroke: points_per_stroke.max(2),
        }
    }

    fn vectorize(&self, sample: &GestureSample) -> Option<Vec<f64>> {
        let points: Vec<Point> = sample
            .strokes()
            .iter()
            .flat_map(|stroke| resample(stroke, self.points_per_stroke))
            .collect();

        let count = points.len() as f64;
        let cx = points.iter().map(|p| p.x).sum::<f64>() / count;
        let cy = points.iter().map(|p| p.y).sum::<f64>() / count;

        let mut vector: Vec<f64> = points
            .iter()
            .flat_map(|p| [p.x - cx, p.y - cy])
            .collect();
        let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm <= f64::EPSILON {
            return None;
        }
        vector.iter_mut().for_each(|v| *v /= norm);
        Some(vector)
    }
}

impl GestureMatcher for ResampledPathMatcher {
    fn score(&self, candidate: &GestureSample, library: &TemplateLibrary) -> Vec<MatchResult> {
        let Some(candidate_vector) = self.vectorize(candidate) else {
            return Vec::new();
        };

        let mut results: Vec<MatchResult> = library
            .iter()
            .flat_map(|(owner, samples)| samples.iter().map(move |sample| (owner, sample)))
            .filter_map(|(owner, sample)| {
                let template_vector = self.vectorize(sample)?;
                if template_vector.len() != candidate_vector.len() {
                    return None;
                }
                let cosine: f64 = candidate_vector
                    .iter()
                    .zip(&template_vector)
                    .map(|(a, b)| a * b)
                    .sum();
                let angle = cosine.clamp(-1.0, 1.0).acos();
                let score = if angle <= 1.0 / MAX_SCORE {
                    MAX_SCORE
                } else {
                    1.0 / angle
                };
                Some(MatchResult {
                    candidate_owner: owner.clone(),
                    score,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results
    }
}

fn distance(a: Point, b: Point) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
}

fn resample(stroke: &[Point], n: usize) -> Vec<Point> {
    let (Some(&first), Some(&last)) = (stroke.first(), stroke.last()) else {
        return Vec::new();
    };
    let length: f64 = stroke.windows(2).map(|w| distance(w[0], w[1])).sum();
    if length <= f64::EPSILON {
        return vec![first; n];
    }

    let interval = length / (n - 1) as f64;
    let mut out = Vec::with_capacity(n);
    out.push(first);

    let mut accumulated = 0.0;
    let mut previous = first;
    let mut index = 1;
    while index < stroke.len() && out.len() < n {
        let current = stroke[index];
        let step = distance(previous, current);
        if step > 0.0 && accumulated + step >= interval {
            let t = (interval - accumulated) / step;
            let q = Point::new(
                previous.x + t * (current.x - previous.x),
                previous.y + t * (current.y - previous.y),
            );
            out.push(q);
            previous = q;
            accumulated = 0.0;
        } else {
            accumulated += step;
            previous = current;
            index += 1;
        }
    }
    // Rounding can leave the tail one short.
    out.resize(n, last);
    out
}
