//! Exported model artifacts: safetensors weights plus a JSON manifest.
//!
//! An artifact at base path `models/attention` consists of
//! `models/attention.safetensors` and `models/attention.json`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use candle_core::Device;
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

use super::{safetensors_from_bytes, AttentionSequenceModel, SequenceShape};

/// Manifest format understood by this build.
pub const FORMAT_VERSION: u32 = 1;

/// Metadata stored next to the weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// Manifest format.
    pub format_version: u32,
    /// Network architecture name.
    pub architecture: String,
    /// Frames per window.
    pub seq_len: usize,
    /// Colour channels.
    pub channels: usize,
    /// Crop height.
    pub height: usize,
    /// Crop width.
    pub width: usize,
    /// Hex SHA-256 of the weights file.
    pub weights_sha256: String,
    /// Export time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
}

impl ArtifactManifest {
    /// Input shape the artifact expects.
    #[must_use]
    pub const fn shape(&self) -> SequenceShape {
        SequenceShape {
            seq_len: self.seq_len,
            channels: self.channels,
            height: self.height,
            width: self.width,
        }
    }

    /// Checks that this build can serve the artifact with `expected` input.
    ///
    /// # Errors
    ///
    /// Returns a description of the first incompatibility found.
    pub fn check_compatible(&self, expected: SequenceShape) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            bail!(
                "unsupported manifest format {} (expected {FORMAT_VERSION})",
                self.format_version
            );
        }
        if self.architecture != AttentionSequenceModel::ARCHITECTURE {
            bail!("unknown architecture '{}'", self.architecture);
        }
        if self.shape() != expected {
            bail!(
                "artifact input (N={}, C={}, H={}, W={}) does not match configured (N={}, C={}, H={}, W={})",
                self.seq_len,
                self.channels,
                self.height,
                self.width,
                expected.seq_len,
                expected.channels,
                expected.height,
                expected.width
            );
        }
        Ok(())
    }
}

/// Weights and manifest paths for an artifact base path.
///
/// A trailing `.safetensors` or `.json` on `base` is ignored, so either file
/// of the pair can be passed.
#[must_use]
pub fn artifact_paths(base: &Path) -> (PathBuf, PathBuf) {
    let stem = match base.extension().and_then(|e| e.to_str()) {
        Some("safetensors" | "json") => base.with_extension(""),
        _ => base.to_path_buf(),
    };
    let with = |ext: &str| {
        let mut s = OsString::from(stem.as_os_str());
        s.push(ext);
        PathBuf::from(s)
    };
    (with(".safetensors"), with(".json"))
}

/// Hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Reads the manifest of the artifact at `base`.
///
/// # Errors
///
/// Returns an error if the manifest is missing or malformed.
pub fn read_manifest(base: &Path) -> Result<ArtifactManifest> {
    let (_, manifest_path) = artifact_paths(base);
    let text = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("Failed to read manifest: {}", manifest_path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid manifest: {}", manifest_path.display()))
}

/// Whether the weights on disk still match the manifest checksum.
///
/// # Errors
///
/// Returns an error if the weights file cannot be read.
pub fn verify_checksum(base: &Path, manifest: &ArtifactManifest) -> Result<bool> {
    let (weights_path, _) = artifact_paths(base);
    let data = std::fs::read(&weights_path)
        .with_context(|| format!("Failed to read weights: {}", weights_path.display()))?;
    Ok(sha256_hex(&data) == manifest.weights_sha256)
}

/// Writes the variables of a trained model as an artifact at `base`.
///
/// # Errors
///
/// Returns an error if either file cannot be written.
pub fn export_artifact(varmap: &VarMap, shape: SequenceShape, base: &Path) -> Result<ArtifactManifest> {
    let (weights_path, manifest_path) = artifact_paths(base);
    if let Some(parent) = weights_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    varmap
        .save(&weights_path)
        .with_context(|| format!("Failed to write weights: {}", weights_path.display()))?;
    let data = std::fs::read(&weights_path)?;

    let manifest = ArtifactManifest {
        format_version: FORMAT_VERSION,
        architecture: AttentionSequenceModel::ARCHITECTURE.to_string(),
        seq_len: shape.seq_len,
        channels: shape.channels,
        height: shape.height,
        width: shape.width,
        weights_sha256: sha256_hex(&data),
        exported_at: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
    };
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("Failed to write manifest: {}", manifest_path.display()))?;

    info!("Exported model artifact to {}", weights_path.display());
    Ok(manifest)
}

/// Loads and validates the artifact at `base` for `expected` input.
///
/// # Errors
///
/// Returns an error if a file is missing, the manifest is incompatible, the
/// checksum does not match, or the weights do not fit the architecture.
pub fn load_artifact(
    base: &Path,
    expected: SequenceShape,
    device: &Device,
) -> Result<AttentionSequenceModel> {
    let manifest = read_manifest(base)?;
    manifest.check_compatible(expected)?;

    let (weights_path, _) = artifact_paths(base);
    let data = std::fs::read(&weights_path)
        .with_context(|| format!("Failed to read weights: {}", weights_path.display()))?;
    if sha256_hex(&data) != manifest.weights_sha256 {
        bail!("weights checksum mismatch for {}", weights_path.display());
    }

    let vb = safetensors_from_bytes(&data, device)?;
    AttentionSequenceModel::new(expected, &vb).context("Weights do not fit the architecture")
}
