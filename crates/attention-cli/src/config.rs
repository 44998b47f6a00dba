//! Configuration file support for attention-ml.
//!
//! Supports TOML configuration from:
//! - XDG config: `~/.config/attention-ml/config.toml` (lowest priority)
//! - Project-local: `.attention-ml.toml` (searched up directory tree)
//! - Environment variables and CLI flags (highest priority, applied by each command)

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

/// Hardcoded defaults, the lowest configuration layer.
pub mod defaults {
    use attention_core::pipeline::DEFAULT_SEQUENCE_LENGTH;

    pub const BACKEND_URL: &str = "http://backend:8000";
    pub const TIMEOUT_SECS: u64 = 10;
    pub const SEQUENCE_LENGTH: usize = DEFAULT_SEQUENCE_LENGTH;
    pub const SESSION_TTL_SECS: u64 = 600;
    pub const MODEL_PATH: &str = "checkpoints/attention";
    pub const IMAGE_SIZE: usize = 224;
    pub const BIND: &str = "0.0.0.0:9000";
    pub const STRIDE: usize = attention_core::dataset::DEFAULT_STRIDE;
    pub const DATASET_PATH: &str = "data/frames_dataset.jsonl";
    pub const CHECKPOINT_DIR: &str = "checkpoints";
    pub const EPOCHS: usize = 5;
    pub const BATCH_SIZE: usize = 4;
    pub const LEARNING_RATE: f64 = 1e-3;
}

/// Top-level configuration structure.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Record-keeping backend.
    pub backend: BackendConfig,
    /// Session windows.
    pub window: WindowConfig,
    /// Attention model artifact.
    pub model: ModelConfig,
    /// Landmark detector weights.
    pub detector: DetectorSection,
    /// HTTP server.
    pub server: ServerConfig,
    /// Face-crop capture.
    pub capture: CaptureConfig,
    /// Dataset export.
    pub export: ExportConfig,
    /// Model training.
    pub training: TrainingSection,
}

/// Backend configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL events are posted under.
    pub url: Option<String>,
    /// Bearer token; forwarding is disabled without one.
    pub token: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// Window configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window length N.
    pub sequence_length: Option<usize>,
    /// Idle time after which a session's windows are dropped.
    pub session_ttl_secs: Option<u64>,
}

/// Model artifact configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Artifact base path (`<path>.safetensors` + `<path>.json`).
    pub path: Option<PathBuf>,
    /// Square crop side the model expects.
    pub image_size: Option<usize>,
}

/// Detector configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorSection {
    /// `BlazeFace` weights.
    pub blazeface_path: Option<PathBuf>,
    /// Eye-landmark regressor weights.
    pub eye_landmarks_path: Option<PathBuf>,
    /// Minimum face detection confidence.
    pub min_face_confidence: Option<f32>,
}

/// Server configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: Option<String>,
}

/// Capture configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Directory face crops are archived under; capture is off when unset.
    pub frames_dir: Option<PathBuf>,
}

/// Export configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Window stride S.
    pub stride: Option<usize>,
    /// Output dataset path.
    pub out: Option<PathBuf>,
    /// "features" or "frames".
    pub mode: Option<String>,
}

/// Training configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    /// Frame-mode dataset to train on.
    pub dataset: Option<PathBuf>,
    /// Number of epochs.
    pub epochs: Option<usize>,
    /// Batch size.
    pub batch_size: Option<usize>,
    /// Learning rate.
    pub lr: Option<f64>,
    /// Split and shuffle seed.
    pub seed: Option<u64>,
    /// Checkpoint and metrics directory.
    pub checkpoint_dir: Option<PathBuf>,
    /// Train in the background when `serve` starts.
    pub on_start: Option<bool>,
}

impl AppConfig {
    /// Load configuration from XDG and project-local files.
    ///
    /// Priority (lowest to highest):
    /// 1. XDG config: `~/.config/attention-ml/config.toml`
    /// 2. Project-local: `.attention-ml.toml` (searched up from cwd)
    ///
    /// Missing files are silently ignored. Invalid values are logged as
    /// warnings and fall back to their defaults.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load XDG config (lowest priority)
        if let Some(xdg_path) = xdg_config_path() {
            if xdg_path.exists() {
                info!("Loading XDG config: {}", xdg_path.display());
                if let Some(xdg_config) = load_file(&xdg_path) {
                    config = xdg_config;
                }
            } else {
                debug!("XDG config not found: {}", xdg_path.display());
            }
        }

        // Load project-local config (higher priority, merged)
        if let Some(project_path) = find_project_config() {
            info!("Loading project config: {}", project_path.display());
            if let Some(project_config) = load_file(&project_path) {
                config.merge(project_config);
            }
        }

        for problem in config.validate() {
            eprintln!("warning: {problem}; using the default");
        }

        config
    }

    /// Checks value ranges, clearing every invalid value so its default
    /// applies. Returns one message per cleared value.
    pub fn validate(&mut self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut positive = |name: &str, value: &mut Option<usize>| {
            if *value == Some(0) {
                problems.push(format!("{name} must be positive"));
                *value = None;
            }
        };
        positive("window.sequence_length", &mut self.window.sequence_length);
        positive("model.image_size", &mut self.model.image_size);
        positive("export.stride", &mut self.export.stride);
        positive("training.epochs", &mut self.training.epochs);
        positive("training.batch_size", &mut self.training.batch_size);

        if self.backend.timeout_secs == Some(0) {
            problems.push("backend.timeout_secs must be positive".to_string());
            self.backend.timeout_secs = None;
        }
        if self.window.session_ttl_secs == Some(0) {
            problems.push("window.session_ttl_secs must be positive".to_string());
            self.window.session_ttl_secs = None;
        }
        if let Some(c) = self.detector.min_face_confidence {
            if !(0.0..=1.0).contains(&c) {
                problems.push(format!("detector.min_face_confidence must be 0.0-1.0, got {c}"));
                self.detector.min_face_confidence = None;
            }
        }
        if let Some(lr) = self.training.lr {
            if !(lr.is_finite() && lr > 0.0) {
                problems.push(format!("training.lr must be positive, got {lr}"));
                self.training.lr = None;
            }
        }
        if let Some(ref mode) = self.export.mode {
            if mode != "features" && mode != "frames" {
                problems.push(format!("export.mode must be 'features' or 'frames', got '{mode}'"));
                self.export.mode = None;
            }
        }

        problems
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` when present.
    fn merge(&mut self, other: Self) {
        // Backend
        self.backend.url = other.backend.url.or_else(|| self.backend.url.take());
        self.backend.token = other.backend.token.or_else(|| self.backend.token.take());
        self.backend.timeout_secs = other.backend.timeout_secs.or(self.backend.timeout_secs);

        // Window
        self.window.sequence_length = other.window.sequence_length.or(self.window.sequence_length);
        self.window.session_ttl_secs = other.window.session_ttl_secs.or(self.window.session_ttl_secs);

        // Model
        self.model.path = other.model.path.or_else(|| self.model.path.take());
        self.model.image_size = other.model.image_size.or(self.model.image_size);

        // Detector
        self.detector.blazeface_path = other
            .detector
            .blazeface_path
            .or_else(|| self.detector.blazeface_path.take());
        self.detector.eye_landmarks_path = other
            .detector
            .eye_landmarks_path
            .or_else(|| self.detector.eye_landmarks_path.take());
        self.detector.min_face_confidence = other
            .detector
            .min_face_confidence
            .or(self.detector.min_face_confidence);

        // Server and capture
        self.server.bind = other.server.bind.or_else(|| self.server.bind.take());
        self.capture.frames_dir = other
            .capture
            .frames_dir
            .or_else(|| self.capture.frames_dir.take());

        // Export
        self.export.stride = other.export.stride.or(self.export.stride);
        self.export.out = other.export.out.or_else(|| self.export.out.take());
        self.export.mode = other.export.mode.or_else(|| self.export.mode.take());

        // Training
        self.training.dataset = other.training.dataset.or_else(|| self.training.dataset.take());
        self.training.epochs = other.training.epochs.or(self.training.epochs);
        self.training.batch_size = other.training.batch_size.or(self.training.batch_size);
        self.training.lr = other.training.lr.or(self.training.lr);
        self.training.seed = other.training.seed.or(self.training.seed);
        self.training.checkpoint_dir = other
            .training
            .checkpoint_dir
            .or_else(|| self.training.checkpoint_dir.take());
        self.training.on_start = other.training.on_start.or(self.training.on_start);
    }
}

/// Get the XDG config file path.
fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("attention-ml").join("config.toml"))
}

/// Find project-local config by searching up from current directory.
fn find_project_config() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_parents(&cwd)
}

/// Search for `.attention-ml.toml` in the given directory and its parents.
fn find_config_in_parents(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);

    while let Some(dir) = current {
        let config_path = dir.join(".attention-ml.toml");
        if config_path.exists() {
            return Some(config_path);
        }
        current = dir.parent();
    }

    None
}

/// Load and parse a TOML config file.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return None;
        }
    };

    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Failed to parse config file {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.window.sequence_length.is_none());
        assert!(config.backend.token.is_none());
        assert!(config.training.on_start.is_none());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: AppConfig = toml::from_str("").expect("parse empty config");
        assert!(config.model.path.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r"
[backend]
url = 'http://localhost:8000'
token = 'abc'
timeout_secs = 5

[window]
sequence_length = 8
session_ttl_secs = 120

[model]
path = 'models/attention'
image_size = 112

[detector]
blazeface_path = 'w/blazeface.safetensors'
eye_landmarks_path = 'w/eyes.safetensors'
min_face_confidence = 0.6

[server]
bind = '127.0.0.1:9100'

[capture]
frames_dir = 'frames'

[export]
stride = 2
out = 'data/out.jsonl'
mode = 'frames'

[training]
dataset = 'data/frames.jsonl'
epochs = 3
batch_size = 2
lr = 0.0005
seed = 7
checkpoint_dir = 'ckpt'
on_start = true
";
        let config: AppConfig = toml::from_str(toml).expect("parse full config");

        assert_eq!(config.backend.url.as_deref(), Some("http://localhost:8000"));
        assert_eq!(config.backend.timeout_secs, Some(5));
        assert_eq!(config.window.sequence_length, Some(8));
        assert_eq!(config.model.image_size, Some(112));
        assert_eq!(config.detector.min_face_confidence, Some(0.6));
        assert_eq!(config.server.bind.as_deref(), Some("127.0.0.1:9100"));
        assert_eq!(config.capture.frames_dir, Some(PathBuf::from("frames")));
        assert_eq!(config.export.mode.as_deref(), Some("frames"));
        assert_eq!(config.training.epochs, Some(3));
        assert_eq!(config.training.on_start, Some(true));
    }

    #[test]
    fn test_merge_configs() {
        let mut base: AppConfig = toml::from_str(
            r"
[window]
sequence_length = 16

[backend]
url = 'http://a'
",
        )
        .expect("parse base");

        let override_config: AppConfig = toml::from_str(
            r"
[window]
sequence_length = 8

[training]
epochs = 2
",
        )
        .expect("parse override");

        base.merge(override_config);

        assert_eq!(base.window.sequence_length, Some(8));
        assert_eq!(base.backend.url.as_deref(), Some("http://a"));
        assert_eq!(base.training.epochs, Some(2));
    }

    #[test]
    fn test_merge_empty_override_preserves_base() {
        let mut base: AppConfig = toml::from_str(
            r"
[model]
path = 'm'
",
        )
        .expect("parse base");

        base.merge(AppConfig::default());

        assert_eq!(base.model.path, Some(PathBuf::from("m")));
    }

    #[test]
    fn test_invalid_field_type_handled() {
        let toml = r#"
[window]
sequence_length = "sixteen"
"#;
        let result: Result<AppConfig, _> = toml::from_str(toml);
        assert!(result.is_err(), "type mismatch should return error");
    }

    #[test]
    fn test_find_config_in_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(".attention-ml.toml"), "").unwrap();

        let found = find_config_in_parents(&nested).unwrap();
        assert_eq!(found, dir.path().join(".attention-ml.toml"));
    }

    // === Validation Tests ===

    #[test]
    fn test_validate_clears_invalid_values() {
        let mut config = AppConfig::default();
        config.window.sequence_length = Some(0);
        config.detector.min_face_confidence = Some(1.5);
        config.export.mode = Some("parquet".to_string());
        config.training.lr = Some(-1.0);
        config.export.stride = Some(3);

        let problems = config.validate();
        assert_eq!(problems.len(), 4);
        assert!(problems.iter().any(|p| p.contains("window.sequence_length")));
        assert!(problems.iter().any(|p| p.contains("detector.min_face_confidence")));
        assert!(problems.iter().any(|p| p.contains("export.mode")));
        assert!(problems.iter().any(|p| p.contains("training.lr")));

        assert!(config.window.sequence_length.is_none());
        assert!(config.detector.min_face_confidence.is_none());
        assert!(config.export.mode.is_none());
        assert!(config.training.lr.is_none());
        assert_eq!(config.export.stride, Some(3));
    }

    #[test]
    fn test_validate_empty_config_passes() {
        assert!(AppConfig::default().validate().is_empty());
    }
}
