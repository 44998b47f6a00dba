//! Detector weights directory.

use std::path::PathBuf;

/// Detector weight file metadata.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model name/identifier.
    pub name: &'static str,
    /// What the weights are used for.
    pub description: &'static str,
    /// Filename in models directory.
    pub filename: &'static str,
}

/// Name of the face detector weights.
pub const BLAZEFACE: &str = "blazeface";
/// Name of the eye-landmark regressor weights.
pub const EYE_LANDMARKS: &str = "eye_landmarks";

/// Known detector models.
pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: BLAZEFACE,
        description: "face box and keypoints (128x128 input)",
        filename: "blazeface.safetensors",
    },
    ModelInfo {
        name: EYE_LANDMARKS,
        description: "eye contour and iris regressor (34x26 grayscale input)",
        filename: "eye_landmarks.safetensors",
    },
];

/// Returns the models directory path.
///
/// Uses `XDG_DATA_HOME/attention-ml/models` or `~/.local/share/attention-ml/models`.
#[must_use]
pub fn models_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("attention-ml")
        .join("models")
}

/// Returns the path to a specific model file.
#[must_use]
pub fn model_path(name: &str) -> Option<PathBuf> {
    MODELS
        .iter()
        .find(|m| m.name == name)
        .map(|m| models_dir().join(m.filename))
}

/// Checks if all models are installed.
#[must_use]
pub fn all_models_installed() -> bool {
    let dir = models_dir();
    MODELS.iter().all(|m| dir.join(m.filename).exists())
}

/// Lists known models with their install status.
#[must_use]
pub fn list_models() -> Vec<(&'static ModelInfo, bool)> {
    let dir = models_dir();
    MODELS
        .iter()
        .map(|m| (m, dir.join(m.filename).exists()))
        .collect()
}
