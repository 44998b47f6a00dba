//! Continuous phase labels from hit/error/omission counts.

use crate::domain::PhaseSummary;

/// Keeps precision and recall defined for phases without hits.
pub const EPSILON: f64 = 1e-6;
/// Weight of the speed bonus added to F1.
pub const SPEED_WEIGHT: f64 = 0.1;
/// Hits per second that earn the full speed bonus.
pub const SPEED_SCALE: f64 = 10.0;

/// F1 of the phase; 0 when precision and recall are both 0.
#[must_use]
pub fn f1_score(summary: &PhaseSummary) -> f64 {
    let precision = summary.hits / (summary.hits + summary.errors + EPSILON);
    let recall = summary.hits / (summary.hits + summary.omissions + EPSILON);
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

/// `min(hits / duration / 10, 1)`, or 0 without a positive duration.
#[must_use]
pub fn speed_bonus(hits: f64, duration_secs: Option<f64>) -> f64 {
    match duration_secs {
        Some(d) if d > 0.0 => (hits / d / SPEED_SCALE).min(1.0),
        _ => 0.0,
    }
}

/// Label `y = clamp(f1 + 0.1 · speed, 0, 1)` of one phase.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn phase_label(summary: &PhaseSummary, duration_secs: Option<f64>) -> f32 {
    let y = f1_score(summary) + SPEED_WEIGHT * speed_bonus(summary.hits, duration_secs);
    y.clamp(0.0, 1.0) as f32
}
