//! Persisted records consumed by offline dataset construction, and the
//! windowed samples it produces.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::event::flag;

/// Hit/error/omission counts of one test phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    /// Correct responses.
    #[serde(default)]
    pub hits: f64,
    /// Wrong responses.
    #[serde(default)]
    pub errors: f64,
    /// Missed targets.
    #[serde(default)]
    pub omissions: f64,
}

/// One phase of a completed diagnostic test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    /// Phase number as tagged on live events.
    #[serde(default)]
    pub phase: i64,
    /// Start, epoch milliseconds.
    #[serde(default)]
    pub start: Option<f64>,
    /// End, epoch milliseconds.
    #[serde(default)]
    pub end: Option<f64>,
    /// Performance counts.
    #[serde(default)]
    pub summary: PhaseSummary,
}

impl PhaseRecord {
    /// Phase duration in seconds, floored at 1 ms, when both bounds are known.
    /// A zero timestamp counts as unknown.
    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        let known = |t: Option<f64>| t.filter(|t| *t != 0.0);
        match (known(self.start), known(self.end)) {
            (Some(start), Some(end)) => Some(((end - start) / 1000.0).max(0.001)),
            _ => None,
        }
    }
}

/// Phase breakdown stored with a diagnostic result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseData {
    /// Per-phase records.
    #[serde(default)]
    pub phases: Vec<PhaseRecord>,
}

/// A completed diagnostic test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    /// Diagnostic session the test ran in.
    pub session_id: i64,
    /// Tested user.
    pub user_id: i64,
    /// Phase summaries.
    #[serde(default)]
    pub phase_data: PhaseData,
}

/// A persisted per-frame event, as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Diagnostic session id.
    pub session_id: i64,
    /// Observed user.
    pub user_id: i64,
    /// Capture time.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Emitted score.
    #[serde(default)]
    pub value: Option<f32>,
    /// Emitted label.
    #[serde(default)]
    pub label: String,
    /// Emitted payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RawEvent {
    /// Phase from `data.context.phase`, if tagged.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn phase(&self) -> Option<i64> {
        let phase = self.data.get("context")?.get("phase")?;
        phase
            .as_i64()
            .or_else(|| phase.as_f64().map(|p| p as i64))
    }

    /// Distractor flag from `data.context.spinning`.
    #[must_use]
    pub fn spinning(&self) -> bool {
        self.data
            .get("context")
            .and_then(|c| c.get("spinning"))
            .is_some_and(flag::from_json)
    }

    /// Archived frame path from `data.frame.frame_path`.
    #[must_use]
    pub fn frame_path(&self) -> Option<&str> {
        self.data.get("frame")?.get("frame_path")?.as_str()
    }

    /// Numeric field `data.<section>.<key>`, 0 when missing or not numeric.
    #[must_use]
    pub fn number(&self, section: &str, key: &str) -> f32 {
        self.data
            .get(section)
            .and_then(|s| s.get(key))
            .map_or(0.0, number_or_zero)
    }

    /// Whether `data.frame.face` is set.
    #[must_use]
    pub fn face(&self) -> bool {
        self.data
            .get("frame")
            .and_then(|f| f.get("face"))
            .is_some_and(flag::from_json)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn number_or_zero(value: &serde_json::Value) -> f32 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0) as f32,
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        serde_json::Value::Bool(b) => f32::from(u8::from(*b)),
        // Vector-valued cues (gaze offset) collapse to their Euclidean norm.
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| number_or_zero(v).powi(2))
            .sum::<f32>()
            .sqrt(),
        _ => 0.0,
    }
}

/// Which payload a dataset export carries per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// Scalar feature vectors read from the stored events.
    #[default]
    Features,
    /// References to archived frame images.
    Frames,
}

/// Per-window payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SamplePayload {
    /// `N` feature vectors.
    Features {
        /// Feature vectors in time order.
        #[serde(rename = "X")]
        x: Vec<Vec<f32>>,
    },
    /// `N` frame image paths.
    Frames {
        /// Frame paths in time order.
        frames_paths: Vec<String>,
    },
}

/// One fixed-length training example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedSample {
    /// Diagnostic session id.
    pub session_id: i64,
    /// Tested user; splits are made on this.
    pub user_id: i64,
    /// Phase the window was cut from.
    pub phase: i64,
    /// Phase label in `[0, 1]`.
    pub y: f32,
    /// Window content.
    #[serde(flatten)]
    pub payload: SamplePayload,
    /// 1 for frames that count, 0 for distractor frames.
    pub mask: Vec<u8>,
}

impl WindowedSample {
    /// Frame paths, when this is a frame-mode sample.
    #[must_use]
    pub fn frame_paths(&self) -> Option<&[String]> {
        match &self.payload {
            SamplePayload::Frames { frames_paths } => Some(frames_paths),
            SamplePayload::Features { .. } => None,
        }
    }
}
