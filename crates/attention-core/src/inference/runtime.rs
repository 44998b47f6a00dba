//! Serving-time holder of the optional sequence model.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use candle_core::{Device, Module, Tensor};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use super::{load_artifact, AttentionSequenceModel, SequenceShape};

/// Why no model score was produced for a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unavailable {
    /// No artifact is loaded.
    NotLoaded,
    /// The frame has no face, so nothing was scored.
    NoFace,
    /// The frame falls in a distractor interval.
    Distractor,
    /// Fewer than N face crops are buffered.
    WindowNotFull {
        /// Buffered crops.
        len: usize,
        /// Crops needed.
        required: usize,
    },
    /// Preprocessing or execution failed.
    Failed {
        /// Error description.
        message: String,
    },
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLoaded => write!(f, "model not loaded"),
            Self::NoFace => write!(f, "no face in frame"),
            Self::Distractor => write!(f, "distractor interval"),
            Self::WindowNotFull { len, required } => write!(f, "window {len}/{required}"),
            Self::Failed { message } => write!(f, "inference failed: {message}"),
        }
    }
}

/// Result of asking the runtime for a score.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutcome {
    /// Learned score in `[0, 1]`.
    Scored(f32),
    /// No score; the caller falls back to the heuristic.
    Unavailable(Unavailable),
}

impl ModelOutcome {
    /// The score, if any.
    #[must_use]
    pub const fn score(&self) -> Option<f32> {
        match self {
            Self::Scored(s) => Some(*s),
            Self::Unavailable(_) => None,
        }
    }
}

/// Load state reported by `/debug/status`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    /// Whether a model is serving.
    pub loaded: bool,
    /// Why not, when not loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Configured artifact path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

enum ModelState {
    Loaded(Arc<AttentionSequenceModel>),
    NotLoaded(String),
}

/// Optional sequence model with best-effort loading.
///
/// A missing or incompatible artifact leaves the runtime in a not-loaded
/// state; it never fails construction.
pub struct ModelRuntime {
    path: Option<PathBuf>,
    shape: SequenceShape,
    device: Device,
    state: RwLock<ModelState>,
}

impl ModelRuntime {
    /// Creates the runtime and tries to load the artifact at `path`.
    #[must_use]
    pub fn new(path: Option<PathBuf>, shape: SequenceShape, device: Device) -> Self {
        let runtime = Self {
            path,
            shape,
            device,
            state: RwLock::new(ModelState::NotLoaded("not yet loaded".to_string())),
        };
        runtime.reload();
        runtime
    }

    /// Re-reads the artifact and swaps it in. Returns whether a model is loaded.
    ///
    /// On failure a previously loaded model is dropped as well, so a serving
    /// model always matches what is on disk.
    pub fn reload(&self) -> bool {
        let next = match &self.path {
            None => ModelState::NotLoaded("no model path configured".to_string()),
            Some(path) => match load_artifact(path, self.shape, &self.device) {
                Ok(model) => {
                    info!("Loaded attention model from {}", path.display());
                    ModelState::Loaded(Arc::new(model))
                }
                Err(e) => {
                    warn!("Attention model unavailable, using heuristic scoring: {e:#}");
                    ModelState::NotLoaded(format!("{e:#}"))
                }
            },
        };
        let loaded = matches!(next, ModelState::Loaded(_));
        *self.state.write() = next;
        loaded
    }

    /// Input shape the runtime serves.
    #[must_use]
    pub const fn shape(&self) -> SequenceShape {
        self.shape
    }

    /// Whether a model is loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.read(), ModelState::Loaded(_))
    }

    /// Current load state.
    #[must_use]
    pub fn status(&self) -> ModelStatus {
        let reason = match &*self.state.read() {
            ModelState::Loaded(_) => None,
            ModelState::NotLoaded(reason) => Some(reason.clone()),
        };
        ModelStatus {
            loaded: reason.is_none(),
            reason,
            path: self.path.clone(),
        }
    }

    /// Scores a window of `(C, H, W)` face crops.
    ///
    /// Never fails: every problem is reported as [`ModelOutcome::Unavailable`].
    pub fn infer(&self, frames: &[Tensor], spinning: bool) -> ModelOutcome {
        let model = match &*self.state.read() {
            ModelState::Loaded(model) => Arc::clone(model),
            ModelState::NotLoaded(_) => return ModelOutcome::Unavailable(Unavailable::NotLoaded),
        };
        if spinning {
            return ModelOutcome::Unavailable(Unavailable::Distractor);
        }
        if frames.len() < self.shape.seq_len {
            return ModelOutcome::Unavailable(Unavailable::WindowNotFull {
                len: frames.len(),
                required: self.shape.seq_len,
            });
        }

        let window = &frames[frames.len() - self.shape.seq_len..];
        match self.run(&model, window) {
            Ok(score) if score.is_finite() => ModelOutcome::Scored(score.clamp(0.0, 1.0)),
            Ok(score) => ModelOutcome::Unavailable(Unavailable::Failed {
                message: format!("non-finite output {score}"),
            }),
            Err(e) => {
                warn!("Attention model inference failed: {e}");
                ModelOutcome::Unavailable(Unavailable::Failed {
                    message: e.to_string(),
                })
            }
        }
    }

    fn run(&self, model: &AttentionSequenceModel, window: &[Tensor]) -> candle_core::Result<f32> {
        let x = Tensor::stack(window, 0)?
            .unsqueeze(0)?
            .to_device(&self.device)?;
        model.forward(&x)?.squeeze(0)?.to_scalar::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_path_is_not_loaded() {
        let runtime = ModelRuntime::new(None, SequenceShape::rgb(4, 16), Device::Cpu);
        assert!(!runtime.is_loaded());
        assert!(!runtime.reload());
        let status = runtime.status();
        assert!(!status.loaded);
        assert!(status.reason.is_some());
        assert_eq!(
            runtime.infer(&[], false),
            ModelOutcome::Unavailable(Unavailable::NotLoaded)
        );
    }

    #[test]
    fn test_missing_file_does_not_panic() {
        let runtime = ModelRuntime::new(
            Some(PathBuf::from("/nonexistent/attention")),
            SequenceShape::rgb(4, 16),
            Device::Cpu,
        );
        assert!(!runtime.is_loaded());
        assert!(runtime.status().reason.is_some_and(|r| r.contains("manifest")));
    }

    #[test]
    fn test_unavailable_serialises_with_reason_tag() {
        let v = serde_json::to_value(Unavailable::WindowNotFull { len: 3, required: 16 })
            .unwrap_or_default();
        assert_eq!(v["reason"], "window_not_full");
        assert_eq!(v["len"], 3);
        assert_eq!(Unavailable::Distractor.to_string(), "distractor interval");
    }
}
