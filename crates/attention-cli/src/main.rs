//! attention-ml - webcam attention scoring service, dataset export and model training.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;
mod server;

use commands::{Cli, Commands, ExitCode};
use config::AppConfig;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over -v
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = AppConfig::load();

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::run(&commands::serve::ServeArgs::with_config(args, &config)),
        Commands::Export(args) => {
            commands::export::run(&commands::export::ExportArgs::with_config(args, &config)).map(|_| ())
        }
        Commands::Train(args) => {
            commands::train::run(&commands::train::TrainArgs::with_config(args, &config)).map(|_| ())
        }
        Commands::Models(ref args) => commands::models::run(args),
    };

    let exit_code = match result {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::Error
        }
    };

    exit_code.into()
}
