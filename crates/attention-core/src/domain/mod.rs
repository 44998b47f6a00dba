//! Core domain types for attention inference.

mod dataset;
mod event;
mod features;
mod session;

pub use dataset::{
    DiagnosticResult, ExportMode, PhaseData, PhaseRecord, PhaseSummary, RawEvent, SamplePayload,
    WindowedSample,
};
pub use event::{
    flag, AttentionEvent, EventContext, LABEL_DEFAULT, LABEL_MODEL, LABEL_NO_FACE, LABEL_SEQUENCE,
};
pub use features::{
    BoundingBox, EyeLandmarks, FaceLandmarks, FrameFeatures, Point, EYES_WEIGHT, GAZE_WEIGHT,
    PRESENCE_WEIGHT,
};
pub use session::{SessionRef, SessionRefError};
