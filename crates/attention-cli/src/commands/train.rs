//! Train command - fit the attention sequence model on a frame dataset.

use std::io::IsTerminal;

use anyhow::{Context, Result};
use attention_adapters::{read_samples, FsFrameLoader};
use attention_core::inference::get_device;
use attention_core::training::{Trainer, TrainingReport};
use clap::Args;
use tracing::info;

use super::shared::{ModelArgs, TrainingArgs};
use crate::config::AppConfig;
use crate::output::ProgressBar;

/// Arguments for the train command
#[derive(Args, Clone, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub training: TrainingArgs,

    /// Show progress bar
    #[arg(long)]
    pub progress: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

impl TrainArgs {
    /// Apply configuration file values, respecting CLI precedence.
    pub fn with_config(mut args: Self, config: &AppConfig) -> Self {
        args.model.apply_config(config);
        args.training.apply_config(config);
        args
    }
}

/// Run the train command. Prints the training report as JSON.
pub fn run(args: &TrainArgs) -> Result<TrainingReport> {
    let dataset = args.training.dataset();
    let config = args.training.training_config(&args.model);
    info!(
        dataset = %dataset.display(),
        model = %config.model_path.display(),
        epochs = config.epochs,
        "Training attention model"
    );

    let samples = read_samples(&dataset)
        .with_context(|| format!("Cannot read training dataset {}", dataset.display()))?;
    // Frame paths in the dataset are already resolved by the export.
    let frames = FsFrameLoader::new(None);

    let show_progress = !args.quiet && (args.progress || std::io::stderr().is_terminal());
    let progress = ProgressBar::new(args.quiet, show_progress);

    let report = Trainer::new(config, &frames, get_device()).train(samples, &progress)?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(report)
}
