//! Models command - detector weights and model artifacts.

use std::path::PathBuf;

use anyhow::Result;
use attention_adapters::models::{list_models as adapter_list_models, models_dir};
use attention_core::inference::{read_manifest, verify_checksum};
use clap::{Args, Subcommand};

/// Arguments for the models command
#[derive(Args, Clone, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Models subcommands
#[derive(Subcommand, Clone, Debug)]
pub enum ModelsCommand {
    /// List detector weights and whether they are installed
    List,
    /// Print detector model directory path
    Path,
    /// Show an exported attention model's manifest and verify its checksum
    Inspect {
        /// Artifact base path, or either file of the pair
        artifact: PathBuf,
    },
}

/// Run the models command.
pub fn run(args: &ModelsArgs) -> Result<()> {
    match &args.command {
        ModelsCommand::List => list_models(),
        ModelsCommand::Path => print_path(),
        ModelsCommand::Inspect { artifact } => inspect(artifact),
    }
}

#[allow(clippy::unnecessary_wraps)]
fn list_models() -> Result<()> {
    let models = adapter_list_models();
    let dir = models_dir();

    println!("Models directory: {}", dir.display());
    println!();

    for (info, installed) in &models {
        let status = if *installed { "✓" } else { "✗" };
        println!("  {status} {} ({}) - {}", info.name, info.filename, info.description);
    }

    println!();
    let installed_count = models.iter().filter(|(_, installed)| *installed).count();
    println!("{}/{} models installed", installed_count, models.len());

    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn print_path() -> Result<()> {
    let path = models_dir();
    println!("{}", path.display());
    Ok(())
}

fn inspect(artifact: &std::path::Path) -> Result<()> {
    let manifest = read_manifest(artifact)?;
    let verified = verify_checksum(artifact, &manifest)?;

    let mut value = serde_json::to_value(&manifest)?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("checksum_ok".to_string(), serde_json::Value::Bool(verified));
    }
    println!("{}", serde_json::to_string_pretty(&value)?);

    if !verified {
        anyhow::bail!("weights checksum does not match the manifest");
    }
    Ok(())
}
