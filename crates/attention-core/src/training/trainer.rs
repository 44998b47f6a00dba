//! Sequence-model training on frame-mode datasets.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, warn};

use super::{masked_huber, mean_absolute_error, split_by_user, SplitConfig};
use crate::domain::WindowedSample;
use crate::inference::{export_artifact, AttentionSequenceModel, SequenceShape};
use crate::pipeline::image_to_chw;
use crate::ports::{FrameLoader, ProgressEvent, ProgressSink};

/// Best checkpoint file name inside the checkpoint directory.
pub const BEST_CHECKPOINT: &str = "best.safetensors";
/// Metrics file name inside the checkpoint directory.
pub const METRICS_FILE: &str = "metrics.json";

/// Training hyper-parameters and output locations.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Passes over the training split.
    pub epochs: usize,
    /// Windows per optimiser step.
    pub batch_size: usize,
    /// `AdamW` learning rate.
    pub learning_rate: f64,
    /// Model input shape.
    pub shape: SequenceShape,
    /// User split.
    pub split: SplitConfig,
    /// Directory for `best.safetensors` and `metrics.json`.
    pub checkpoint_dir: PathBuf,
    /// Artifact base path the trained model is exported to.
    pub model_path: PathBuf,
}

impl TrainingConfig {
    /// Defaults: 5 epochs, batch 4, lr 1e-3, N=16 at 224 px.
    #[must_use]
    pub fn new(checkpoint_dir: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            epochs: 5,
            batch_size: 4,
            learning_rate: 1e-3,
            shape: SequenceShape::rgb(16, 224),
            split: SplitConfig::default(),
            checkpoint_dir: checkpoint_dir.into(),
            model_path: model_path.into(),
        }
    }
}

/// Outcome of a training run, written to `metrics.json`.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    /// Best validation loss, when a validation split existed.
    pub val_best: Option<f32>,
    /// Loss on the test split.
    pub test_loss: Option<f32>,
    /// MAE on the test split.
    pub test_mae: Option<f32>,
    /// Training windows.
    pub train_samples: usize,
    /// Validation windows.
    pub val_samples: usize,
    /// Test windows.
    pub test_samples: usize,
    /// Epochs run.
    pub epochs: usize,
    /// Exported artifact base path.
    pub artifact: PathBuf,
}

struct Batch {
    x: Tensor,
    mask: Tensor,
    y: Tensor,
}

/// Fits [`AttentionSequenceModel`] to frame-mode windows.
pub struct Trainer<'a> {
    config: TrainingConfig,
    frames: &'a dyn FrameLoader,
    device: Device,
}

impl<'a> Trainer<'a> {
    /// Trainer reading frames through `frames`.
    #[must_use]
    pub fn new(config: TrainingConfig, frames: &'a dyn FrameLoader, device: Device) -> Self {
        Self {
            config,
            frames,
            device,
        }
    }

    /// Splits, trains, keeps the best checkpoint, evaluates on test, and
    /// exports the artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset is not frame-mode, has no usable
    /// training windows, or a checkpoint/artifact cannot be written.
    pub fn train(&self, samples: Vec<WindowedSample>, progress: &dyn ProgressSink) -> Result<TrainingReport> {
        let cfg = &self.config;
        if cfg.batch_size == 0 || cfg.epochs == 0 {
            bail!("epochs and batch size must be positive");
        }
        let samples = self.usable(samples, progress)?;
        let splits = split_by_user(samples, cfg.split);
        if splits.train.is_empty() {
            bail!("no training windows after the user split");
        }
        info!(
            train = splits.train.len(),
            val = splits.val.len(),
            test = splits.test.len(),
            "Starting training"
        );

        std::fs::create_dir_all(&cfg.checkpoint_dir)
            .with_context(|| format!("Failed to create {}", cfg.checkpoint_dir.display()))?;
        let best_path = cfg.checkpoint_dir.join(BEST_CHECKPOINT);

        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &self.device);
        let model = AttentionSequenceModel::new(cfg.shape, &vb)?;
        let mut optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: cfg.learning_rate,
                ..ParamsAdamW::default()
            },
        )?;

        progress.on_event(ProgressEvent::Started {
            stage: "train".to_string(),
            total: Some(cfg.epochs),
        });

        let mut rng = StdRng::seed_from_u64(cfg.split.seed);
        let mut best: Option<f32> = None;
        let mut val_best = None;

        for epoch in 1..=cfg.epochs {
            let mut order: Vec<usize> = (0..splits.train.len()).collect();
            order.shuffle(&mut rng);

            let mut total = 0.0_f32;
            for chunk in order.chunks(cfg.batch_size) {
                let batch = self.batch(chunk.iter().map(|&i| &splits.train[i]))?;
                let pred = model.forward(&batch.x)?;
                let loss = masked_huber(&pred, &batch.y, &batch.mask)?;
                optimizer.backward_step(&loss)?;
                total += loss.to_scalar::<f32>()? * len_f32(chunk.len());
            }
            let train_loss = total / len_f32(splits.train.len());

            let val = self.evaluate(&model, &splits.val)?;
            let criterion = val.map_or(train_loss, |(loss, _)| loss);
            if best.map_or(true, |b| criterion < b) {
                best = Some(criterion);
                val_best = val.map(|(loss, _)| loss);
                varmap
                    .save(&best_path)
                    .with_context(|| format!("Failed to write {}", best_path.display()))?;
            }

            info!(epoch, train_loss, val_loss = ?val.map(|v| v.0), "Epoch finished");
            progress.on_event(ProgressEvent::Epoch {
                epoch,
                train_loss,
                val_loss: val.map(|v| v.0),
                val_mae: val.map(|v| v.1),
            });
        }

        varmap
            .load(&best_path)
            .with_context(|| format!("Failed to restore {}", best_path.display()))?;
        let test = self.evaluate(&model, &splits.test)?;

        export_artifact(&varmap, cfg.shape, &cfg.model_path)?;

        let report = TrainingReport {
            val_best,
            test_loss: test.map(|t| t.0),
            test_mae: test.map(|t| t.1),
            train_samples: splits.train.len(),
            val_samples: splits.val.len(),
            test_samples: splits.test.len(),
            epochs: cfg.epochs,
            artifact: cfg.model_path.clone(),
        };
        write_metrics(&cfg.checkpoint_dir.join(METRICS_FILE), &report)?;

        progress.on_event(ProgressEvent::Finished {
            summary: format!(
                "model exported to {} (val_best {:?}, test_mae {:?})",
                cfg.model_path.display(),
                report.val_best,
                report.test_mae
            ),
        });
        Ok(report)
    }

    /// Keeps frame-mode windows of the configured length.
    fn usable(&self, samples: Vec<WindowedSample>, progress: &dyn ProgressSink) -> Result<Vec<WindowedSample>> {
        let n = self.config.shape.seq_len;
        if samples.iter().any(|s| s.frame_paths().is_none()) {
            bail!("training needs a frame-mode dataset (frames_paths column)");
        }
        Ok(samples
            .into_iter()
            .filter(|s| {
                let len = s.frame_paths().map_or(0, <[String]>::len);
                let ok = len == n && s.mask.len() == n;
                if !ok {
                    progress.on_event(ProgressEvent::Skipped {
                        item: format!("session {} phase {}", s.session_id, s.phase),
                        reason: format!("window of {len} frames, expected {n}"),
                    });
                }
                ok
            })
            .collect())
    }

    /// Mean loss and MAE over `samples`, or `None` when empty.
    fn evaluate(&self, model: &AttentionSequenceModel, samples: &[WindowedSample]) -> Result<Option<(f32, f32)>> {
        if samples.is_empty() {
            return Ok(None);
        }
        let (mut loss_sum, mut mae_sum) = (0.0_f32, 0.0_f32);
        for chunk in samples.chunks(self.config.batch_size) {
            let batch = self.batch(chunk.iter())?;
            let pred = model.forward(&batch.x)?.detach();
            let weight = len_f32(chunk.len());
            loss_sum += masked_huber(&pred, &batch.y, &batch.mask)?.to_scalar::<f32>()? * weight;
            mae_sum += mean_absolute_error(&pred, &batch.y)? * weight;
        }
        let n = len_f32(samples.len());
        Ok(Some((loss_sum / n, mae_sum / n)))
    }

    fn batch<'s>(&self, samples: impl Iterator<Item = &'s WindowedSample>) -> Result<Batch> {
        let (mut xs, mut masks, mut ys) = (Vec::new(), Vec::new(), Vec::new());
        for sample in samples {
            let frames = sample
                .frame_paths()
                .unwrap_or_default()
                .iter()
                .map(|p| self.frame(p))
                .collect::<Result<Vec<_>>>()?;
            xs.push(Tensor::stack(&frames, 0)?);
            masks.extend(sample.mask.iter().map(|&m| f32::from(m.min(1))));
            ys.push(sample.y.clamp(0.0, 1.0));
        }
        let b = ys.len();
        let n = self.config.shape.seq_len;
        Ok(Batch {
            x: Tensor::stack(&xs, 0)?.to_device(&self.device)?,
            mask: Tensor::from_vec(masks, (b, n), &self.device)?,
            y: Tensor::from_vec(ys, b, &self.device)?,
        })
    }

    /// Loads one frame; unreadable frames become black with a warning.
    fn frame(&self, path: &str) -> Result<Tensor> {
        let size = u32::try_from(self.config.shape.height).context("image size out of range")?;
        match self.frames.load(path).and_then(|img| image_to_chw(&img, size)) {
            Ok(t) => Ok(t),
            Err(e) => {
                warn!("Using a black frame for {path}: {e:#}");
                let (c, h, w) = self.config.shape.frame_dims();
                Ok(Tensor::zeros((c, h, w), DType::F32, &Device::Cpu)?)
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn len_f32(n: usize) -> f32 {
    n as f32
}

fn write_metrics(path: &Path, report: &TrainingReport) -> Result<()> {
    let text = serde_json::to_string_pretty(report)?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}
