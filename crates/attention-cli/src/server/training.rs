//! Background training supervised by the server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use attention_adapters::{read_samples, FsFrameLoader};
use attention_core::inference::{get_device, ModelRuntime};
use attention_core::ports::NoProgress;
use attention_core::training::{Trainer, TrainingConfig, TrainingReport};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// State of the background training job, reported by `/debug/status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrainingStatus {
    /// No training was requested.
    Disabled,
    /// Training is in progress.
    Running,
    /// Training finished and the artifact was exported.
    Succeeded {
        /// Best validation loss.
        val_best: Option<f32>,
        /// Test-split MAE.
        test_mae: Option<f32>,
        /// Whether the runtime picked up the new artifact.
        reloaded: bool,
    },
    /// Training failed.
    Failed {
        /// Error chain.
        message: String,
    },
}

/// Dataset and hyperparameters of one background run.
#[derive(Debug, Clone)]
pub struct TrainingJob {
    /// Frame-mode dataset.
    pub dataset: PathBuf,
    /// Trainer configuration.
    pub config: TrainingConfig,
}

impl TrainingJob {
    fn run(self) -> Result<TrainingReport> {
        let samples = read_samples(&self.dataset)?;
        let frames = FsFrameLoader::new(None);
        Trainer::new(self.config, &frames, get_device()).train(samples, &NoProgress)
    }
}

/// Runs `job` on the blocking pool, publishing progress on `status` and
/// reloading `runtime` when an artifact was exported.
pub fn spawn_training(
    job: TrainingJob,
    runtime: Arc<ModelRuntime>,
    status: watch::Sender<TrainingStatus>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(dataset = %job.dataset.display(), "Background training started");
        status.send_replace(TrainingStatus::Running);

        let next = match tokio::task::spawn_blocking(move || job.run()).await {
            Ok(Ok(report)) => {
                let reloaded = runtime.reload();
                if reloaded {
                    info!(artifact = %report.artifact.display(), "Trained model loaded");
                } else {
                    warn!(artifact = %report.artifact.display(), "Trained model exported but not loaded");
                }
                TrainingStatus::Succeeded {
                    val_best: report.val_best,
                    test_mae: report.test_mae,
                    reloaded,
                }
            }
            Ok(Err(e)) => {
                error!("Background training failed: {e:#}");
                TrainingStatus::Failed {
                    message: format!("{e:#}"),
                }
            }
            Err(e) => {
                error!("Background training panicked: {e}");
                TrainingStatus::Failed {
                    message: e.to_string(),
                }
            }
        };
        status.send_replace(next);
    })
}
