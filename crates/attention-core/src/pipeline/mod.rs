//! Online attention scoring.

mod aggregator;
mod arbiter;
mod extractor;
mod processor;
mod window_store;

pub use aggregator::{aggregate, TemporalScore, EYES_MEAN_WEIGHT, GAZE_MEAN_WEIGHT, SCORE_WEIGHT};
pub use arbiter::{arbitrate, Decision, ScoreSource, ScoredFrame};
pub use extractor::{
    eye_aspect_ratio, eye_openness, face_crop, features_from_landmarks, gaze_center, image_to_chw,
    iris_offset, FeatureExtractor, CROP_PADDING,
};
pub use processor::AttentionPipeline;
pub use window_store::{
    BoundedWindow, FeatureSample, SessionHandle, SessionSnapshot, SessionState, SessionStore,
    DEFAULT_SEQUENCE_LENGTH,
};
