//! Export command - window stored events into a training dataset.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use attention_adapters::{FsFrameLoader, FsRecordSource, JsonlSampleOutput};
use attention_core::dataset::{DatasetWindower, ExportStats, WindowerConfig};
use attention_core::domain::ExportMode;
use clap::{Args, ValueEnum};
use tracing::info;

use super::shared::parse_positive;
use crate::config::{defaults, AppConfig};
use crate::output::ProgressBar;

/// Which payload to export per window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Scalar feature vectors from the stored events
    #[default]
    Features,
    /// Archived frame paths
    Frames,
}

impl From<ModeArg> for ExportMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Features => Self::Features,
            ModeArg::Frames => Self::Frames,
        }
    }
}

/// Arguments for the export command
#[derive(Args, Clone, Debug)]
pub struct ExportArgs {
    /// Backend dump (JSON with `results` and `events`)
    pub records: PathBuf,

    /// Output dataset (JSON Lines)
    #[arg(short, long, env = "DATASET_PATH", value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Payload per window
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Frames per window (N)
    #[arg(long, env = "SEQUENCE_LENGTH", value_parser = parse_positive)]
    pub sequence_length: Option<usize>,

    /// Step between window starts (S)
    #[arg(long, env = "WINDOW_STRIDE", value_parser = parse_positive)]
    pub stride: Option<usize>,

    /// Directory relative frame paths are resolved against
    #[arg(long, value_name = "DIR")]
    pub frames_root: Option<PathBuf>,

    /// Show progress bar
    #[arg(long)]
    pub progress: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

impl ExportArgs {
    /// Apply configuration file values, respecting CLI precedence.
    pub fn with_config(mut args: Self, config: &AppConfig) -> Self {
        if args.out.is_none() {
            args.out.clone_from(&config.export.out);
        }
        if args.mode.is_none() {
            args.mode = config
                .export
                .mode
                .as_deref()
                .and_then(|m| ModeArg::from_str(m, true).ok());
        }
        args.sequence_length = args.sequence_length.or(config.window.sequence_length);
        args.stride = args.stride.or(config.export.stride);
        args
    }

    fn out(&self) -> PathBuf {
        self.out
            .clone()
            .unwrap_or_else(|| PathBuf::from(defaults::DATASET_PATH))
    }

    fn windower_config(&self) -> WindowerConfig {
        WindowerConfig {
            seq_len: self.sequence_length.unwrap_or(defaults::SEQUENCE_LENGTH),
            stride: self.stride.unwrap_or(defaults::STRIDE),
            mode: self.mode.unwrap_or_default().into(),
        }
    }
}

/// Run the export command. Prints the export summary as JSON.
pub fn run(args: &ExportArgs) -> Result<ExportStats> {
    let config = args.windower_config();
    let out = args.out();
    info!(
        records = %args.records.display(),
        out = %out.display(),
        mode = ?config.mode,
        seq_len = config.seq_len,
        stride = config.stride,
        "Exporting dataset"
    );

    let source = FsRecordSource::open(&args.records)?;
    let frames = FsFrameLoader::new(args.frames_root.clone());
    let output = JsonlSampleOutput::create(&out)?;

    let show_progress = !args.quiet && (args.progress || std::io::stderr().is_terminal());
    let progress = ProgressBar::new(args.quiet, show_progress);

    let windower = DatasetWindower::new(&source, config).with_frames(&frames);
    let stats = windower.export(&output, &progress)?;

    println!("{}", serde_json::to_string(&stats)?);
    Ok(stats)
}
