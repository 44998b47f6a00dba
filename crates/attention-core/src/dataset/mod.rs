//! Offline dataset construction from persisted events.

mod labeling;
mod windowing;

pub use labeling::{f1_score, phase_label, speed_bonus, EPSILON, SPEED_SCALE, SPEED_WEIGHT};
pub use windowing::{
    feature_vector, slide_windows, window_count, window_starts, DatasetWindower, ExportStats,
    Window, WindowerConfig, DEFAULT_STRIDE, FEATURE_COUNT,
};
