//! Temporal smoothing of the feature window.

use serde::Serialize;

use super::FeatureSample;

/// Weight of the mean instantaneous score.
pub const SCORE_WEIGHT: f32 = 0.6;
/// Weight of the mean eye openness.
pub const EYES_MEAN_WEIGHT: f32 = 0.2;
/// Weight of the mean gaze centring.
pub const GAZE_MEAN_WEIGHT: f32 = 0.2;

/// Smoothed heuristic score and the window statistics behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemporalScore {
    /// Combined score in `[0, 1]`.
    #[serde(skip)]
    pub value: f32,
    /// Entries the means were taken over.
    pub sequence_len: usize,
    /// Instantaneous score of the newest frame.
    pub frame_score: f32,
    /// Mean instantaneous score.
    pub temporal_mean: f32,
    /// Mean eye openness.
    pub eyes_mean: f32,
    /// Mean gaze centring.
    pub gaze_mean: f32,
}

/// Aggregates a feature window, oldest entry first.
///
/// An empty window scores 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn aggregate(window: &[FeatureSample]) -> TemporalScore {
    let Some(newest) = window.last() else {
        return TemporalScore {
            value: 0.0,
            sequence_len: 0,
            frame_score: 0.0,
            temporal_mean: 0.0,
            eyes_mean: 0.0,
            gaze_mean: 0.0,
        };
    };

    let n = window.len() as f32;
    let mean = |f: fn(&FeatureSample) -> f32| window.iter().map(f).sum::<f32>() / n;
    let temporal_mean = mean(|s| s.score);
    let eyes_mean = mean(|s| s.eye_openness);
    let gaze_mean = mean(|s| s.gaze_center);

    let value = (SCORE_WEIGHT * temporal_mean + EYES_MEAN_WEIGHT * eyes_mean + GAZE_MEAN_WEIGHT * gaze_mean)
        .clamp(0.0, 1.0);

    TemporalScore {
        value,
        sequence_len: window.len(),
        frame_score: newest.score,
        temporal_mean,
        eyes_mean,
        gaze_mean,
    }
}
