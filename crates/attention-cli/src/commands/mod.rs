//! CLI command definitions and handlers.

pub mod export;
pub mod models;
pub mod serve;
pub mod shared;
pub mod train;

use clap::{Parser, Subcommand};

/// attention-ml - Webcam attention scoring
#[derive(Parser)]
#[command(name = "attention-ml")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Serve the frame analysis API
    Serve(serve::ServeArgs),
    /// Window stored events into a training dataset
    Export(export::ExportArgs),
    /// Train the attention sequence model
    Train(train::TrainArgs),
    /// Inspect detector weights and model artifacts
    Models(models::ModelsArgs),
}

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Command completed.
    Success,
    /// Command failed.
    Error,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        match code {
            ExitCode::Success => Self::SUCCESS,
            ExitCode::Error => Self::from(2_u8),
        }
    }
}
