//! Serve command - the frame analysis HTTP service.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use attention_adapters::models::{model_path, models_dir, BLAZEFACE, EYE_LANDMARKS};
use attention_adapters::{FsFrameArchive, HttpEventForwarder};
use attention_core::inference::{get_device, CandleLandmarkDetector, DetectorConfig, ModelRuntime};
use attention_core::pipeline::{AttentionPipeline, FeatureExtractor, SessionStore};
use clap::Args;
use tokio::sync::watch;
use tracing::{info, warn};

use super::shared::{ModelArgs, TrainingArgs};
use crate::config::{defaults, AppConfig};
use crate::server::{self, AppState, TrainingJob, TrainingStatus};

/// Parse a confidence threshold in `[0, 1]`.
fn parse_confidence(s: &str) -> Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not in range 0.0-1.0"))
    }
}

/// Arguments for the serve command
#[derive(Args, Clone, Debug, Default)]
pub struct ServeArgs {
    /// Listen address
    #[arg(long, env = "BIND_ADDR")]
    pub bind: Option<SocketAddr>,

    /// Record-keeping backend base URL
    #[arg(long, env = "BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Bearer token for the backend; forwarding is disabled without one
    #[arg(long, env = "BACKEND_TOKEN", hide_env_values = true)]
    pub backend_token: Option<String>,

    /// Backend request timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub backend_timeout: Option<u64>,

    /// Drop session windows idle for this many seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub session_ttl: Option<u64>,

    /// BlazeFace weights
    #[arg(long, value_name = "PATH")]
    pub blazeface: Option<PathBuf>,

    /// Eye-landmark regressor weights
    #[arg(long, value_name = "PATH")]
    pub eye_landmarks: Option<PathBuf>,

    /// Minimum face detection confidence (0.0-1.0)
    #[arg(long, value_parser = parse_confidence)]
    pub min_face_confidence: Option<f32>,

    /// Archive face crops under this directory for frame-mode export
    #[arg(long, env = "FRAMES_DIR", value_name = "DIR")]
    pub frames_dir: Option<PathBuf>,

    /// Train on the configured dataset in the background after startup
    #[arg(long)]
    pub train_on_start: bool,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub training: TrainingArgs,
}

impl ServeArgs {
    /// Apply configuration file values, respecting CLI precedence.
    pub fn with_config(mut args: Self, config: &AppConfig) -> Self {
        if args.bind.is_none() {
            args.bind = config.server.bind.as_deref().and_then(|b| match b.parse() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    warn!("Ignoring server.bind '{b}': {e}");
                    None
                }
            });
        }
        if args.backend_url.is_none() {
            args.backend_url.clone_from(&config.backend.url);
        }
        if args.backend_token.is_none() {
            args.backend_token.clone_from(&config.backend.token);
        }
        args.backend_timeout = args.backend_timeout.or(config.backend.timeout_secs);
        args.session_ttl = args.session_ttl.or(config.window.session_ttl_secs);
        if args.blazeface.is_none() {
            args.blazeface.clone_from(&config.detector.blazeface_path);
        }
        if args.eye_landmarks.is_none() {
            args.eye_landmarks.clone_from(&config.detector.eye_landmarks_path);
        }
        args.min_face_confidence = args
            .min_face_confidence
            .or(config.detector.min_face_confidence);
        if args.frames_dir.is_none() {
            args.frames_dir.clone_from(&config.capture.frames_dir);
        }
        args.train_on_start = args.train_on_start || config.training.on_start.unwrap_or(false);
        args.model.apply_config(config);
        args.training.apply_config(config);
        args
    }

    fn bind(&self) -> SocketAddr {
        self.bind.unwrap_or_else(|| {
            defaults::BIND
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 9000)))
        })
    }

    fn detector_config(&self) -> DetectorConfig {
        let weights = |flag: &Option<PathBuf>, name: &str| {
            flag.clone()
                .or_else(|| model_path(name))
                .unwrap_or_else(models_dir)
        };
        let mut config = DetectorConfig::new(
            weights(&self.blazeface, BLAZEFACE),
            weights(&self.eye_landmarks, EYE_LANDMARKS),
        );
        if let Some(c) = self.min_face_confidence {
            config.min_face_confidence = c;
        }
        config
    }
}

/// Run the serve command until interrupted.
pub fn run(args: &ServeArgs) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(serve(args))
}

async fn serve(args: &ServeArgs) -> Result<()> {
    let device = get_device();
    let shape = args.model.shape();

    let detector = CandleLandmarkDetector::new(&args.detector_config(), &device);
    if let Err(e) = detector.warm_up() {
        warn!("Landmark detector not ready, frames will fail until weights are installed: {e:#}");
    }

    let model = Arc::new(ModelRuntime::new(Some(args.model.model_path()), shape, device));
    let ttl = Duration::from_secs(args.session_ttl.unwrap_or(defaults::SESSION_TTL_SECS));
    let store = Arc::new(SessionStore::new(shape.seq_len, ttl));

    let mut pipeline = AttentionPipeline::new(
        FeatureExtractor::new(Arc::new(detector)),
        Arc::clone(&store),
        Arc::clone(&model),
    );
    if let Some(dir) = &args.frames_dir {
        info!(dir = %dir.display(), "Capturing face crops");
        pipeline = pipeline.with_archive(Arc::new(FsFrameArchive::new(dir)));
    }

    let forwarder = HttpEventForwarder::new(
        args.backend_url.as_deref().unwrap_or(defaults::BACKEND_URL),
        args.backend_token.clone(),
        Duration::from_secs(args.backend_timeout.unwrap_or(defaults::TIMEOUT_SECS)),
    )?;

    let (status_tx, status_rx) = watch::channel(TrainingStatus::Disabled);
    if args.train_on_start {
        let job = TrainingJob {
            dataset: args.training.dataset(),
            config: args.training.training_config(&args.model),
        };
        server::spawn_training(job, Arc::clone(&model), status_tx);
    }
    server::spawn_sweeper(store, ttl);

    info!(
        sequence_length = shape.seq_len,
        model_loaded = model.is_loaded(),
        forwarding = forwarder.is_enabled(),
        "Attention service starting"
    );
    let state = AppState::new(Arc::new(pipeline), Arc::new(forwarder), status_rx);
    server::serve(args.bind(), state).await
}
