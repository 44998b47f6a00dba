//! Candle networks and model lifecycle.
//!
//! - [`CandleLandmarkDetector`]: `BlazeFace` + eye-landmark regressor
//! - [`AttentionSequenceModel`]: CNN + LSTM window scorer
//! - [`ModelRuntime`]: best-effort loading and inference of exported artifacts

mod artifact;
mod blazeface;
mod detector;
mod device;
mod eye_landmarks;
mod loader;
mod runtime;
mod sequence_model;
mod utils;

pub use artifact::{
    artifact_paths, export_artifact, load_artifact, read_manifest, sha256_hex, verify_checksum,
    ArtifactManifest, FORMAT_VERSION,
};
pub use blazeface::{BlazeFace, FaceDetection};
pub use detector::{CandleLandmarkDetector, DetectorConfig, DEFAULT_MIN_FACE_CONFIDENCE};
pub use device::get_device;
pub use eye_landmarks::{EyeLandmarkRegressor, EyeRegion};
pub use loader::{load_safetensors, safetensors_from_bytes, LazyModel};
pub use runtime::{ModelOutcome, ModelRuntime, ModelStatus, Unavailable};
pub use sequence_model::{AttentionSequenceModel, SequenceShape};
pub use utils::sigmoid;
