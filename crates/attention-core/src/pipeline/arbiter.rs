//! Choice between model score, heuristic score and the no-face sentinel.

use serde::Serialize;
use serde_json::{json, Value};

use super::TemporalScore;
use crate::domain::{
    AttentionEvent, EventContext, FrameFeatures, SessionRef, LABEL_DEFAULT, LABEL_MODEL,
    LABEL_NO_FACE, LABEL_SEQUENCE,
};
use crate::inference::ModelOutcome;

/// Where the emitted value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// Sequence model.
    Model,
    /// Temporal heuristic.
    Heuristic,
    /// No face in the frame; no value.
    NoFace,
}

/// Value and provenance of one frame's emitted score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    /// Emitted value, unset for [`ScoreSource::NoFace`].
    pub value: Option<f32>,
    /// Provenance.
    pub source: ScoreSource,
}

impl Decision {
    /// Event label for this decision.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self.source {
            ScoreSource::Model => LABEL_MODEL,
            ScoreSource::Heuristic => LABEL_SEQUENCE,
            ScoreSource::NoFace => LABEL_NO_FACE,
        }
    }
}

/// Picks the emitted score: no face yields the sentinel, otherwise a model
/// score wins over the heuristic aggregate.
#[must_use]
pub fn arbitrate(face_present: bool, temporal: &TemporalScore, model: &ModelOutcome) -> Decision {
    if !face_present {
        return Decision {
            value: None,
            source: ScoreSource::NoFace,
        };
    }
    match model {
        ModelOutcome::Scored(score) => Decision {
            value: Some(score.clamp(0.0, 1.0)),
            source: ScoreSource::Model,
        },
        ModelOutcome::Unavailable(_) => Decision {
            value: Some(temporal.value.clamp(0.0, 1.0)),
            source: ScoreSource::Heuristic,
        },
    }
}

/// Everything computed for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFrame {
    /// Per-frame cues.
    pub features: FrameFeatures,
    /// Window statistics after appending this frame.
    pub temporal: TemporalScore,
    /// Model attempt.
    pub model: ModelOutcome,
    /// Emitted score.
    pub decision: Decision,
    /// Archived crop reference, when capture is enabled.
    pub frame_path: Option<String>,
}

impl ScoredFrame {
    /// Event `data` payload: frame cues, window statistics, model attempt
    /// and client context.
    #[must_use]
    pub fn event_data(&self, context: &EventContext) -> Value {
        let model = match &self.model {
            ModelOutcome::Scored(score) => json!({ "score": score }),
            ModelOutcome::Unavailable(reason) => json!({
                "unavailable": serde_json::to_value(reason).unwrap_or(Value::Null),
            }),
        };

        json!({
            "frame": self.frame_data(),
            "temporal": self.temporal,
            "model": model,
            "context": context,
        })
    }

    /// Frame cues plus the archived crop path.
    fn frame_data(&self) -> Value {
        let mut frame = serde_json::to_value(self.features).unwrap_or_else(|_| json!({}));
        if let (Some(path), Some(obj)) = (&self.frame_path, frame.as_object_mut()) {
            obj.insert("frame_path".to_string(), Value::String(path.clone()));
        }
        frame
    }

    /// Emitted result `{value, label, data}`, with the window statistics
    /// as `data`.
    #[must_use]
    pub fn score_result(&self) -> Value {
        json!({
            "value": self.decision.value,
            "label": self.decision.label(),
            "data": self.temporal,
        })
    }

    /// Single-frame heuristic result `{value, label, data}`, with the frame
    /// cues as `data`.
    #[must_use]
    pub fn frame_result(&self) -> Value {
        json!({
            "value": self.temporal.frame_score,
            "label": LABEL_DEFAULT,
            "data": self.frame_data(),
        })
    }

    /// Builds the outbound event.
    #[must_use]
    pub fn to_event(&self, session: SessionRef, user_id: i64, context: &EventContext) -> AttentionEvent {
        AttentionEvent::new(
            session,
            user_id,
            self.decision.value,
            self.decision.label(),
            self.event_data(context),
        )
    }
}
