//! Weight loading for safetensors files.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use once_cell::sync::OnceCell;
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A network whose weights are read on first use.
///
/// A failed load is not cached, so installing the weights file later
/// lets the next call succeed without a restart.
pub struct LazyModel<T> {
    path: PathBuf,
    device: Device,
    builder: fn(VarBuilder) -> Result<T>,
    model: OnceCell<T>,
}

impl<T: Send + Sync> LazyModel<T> {
    /// Creates a loader for the weights at `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>, device: Device, builder: fn(VarBuilder) -> Result<T>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            device,
            builder,
            model: OnceCell::new(),
        }
    }

    /// Gets the network, loading it if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid safetensors,
    /// or lacks a tensor the builder needs.
    pub fn get(&self) -> Result<&T> {
        self.model.get_or_try_init(|| {
            debug!("Loading weights from {}", self.path.display());
            let vb = load_safetensors(&self.path, &self.device)?;
            (self.builder)(vb)
        })
    }

    /// Returns true once the network has been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// Weights file backing this model.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads a safetensors file into a `VarBuilder`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the data is invalid.
pub fn load_safetensors(path: impl AsRef<Path>, device: &Device) -> Result<VarBuilder<'static>> {
    let path = path.as_ref();
    debug!("Loading safetensors from {}", path.display());

    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read model file: {}", path.display()))?;

    safetensors_from_bytes(&data, device)
        .with_context(|| format!("Failed to parse safetensors: {}", path.display()))
}

/// Builds a `VarBuilder` from safetensors bytes already in memory.
///
/// Used when the bytes were read once for checksum verification.
///
/// # Errors
///
/// Returns an error if the data is not valid safetensors or holds an
/// unsupported dtype.
pub fn safetensors_from_bytes(data: &[u8], device: &Device) -> Result<VarBuilder<'static>> {
    let tensors = SafeTensors::deserialize(data).context("Invalid safetensors header")?;

    let mut tensor_map: HashMap<String, Tensor> = HashMap::new();
    for name in tensors.names() {
        let view = tensors
            .tensor(name)
            .with_context(|| format!("Failed to get tensor '{name}'"))?;

        let dtype = safetensors_dtype_to_candle(view.dtype())?;
        let tensor = Tensor::from_raw_buffer(view.data(), dtype, view.shape(), device)
            .with_context(|| format!("Failed to create tensor '{name}'"))?
            .to_dtype(DType::F32)
            .with_context(|| format!("Failed to convert tensor '{name}' to f32"))?;

        tensor_map.insert(name.clone(), tensor);
    }

    Ok(VarBuilder::from_tensors(tensor_map, DType::F32, device))
}

fn safetensors_dtype_to_candle(dtype: safetensors::Dtype) -> Result<DType> {
    use safetensors::Dtype as S;
    match dtype {
        S::F32 => Ok(DType::F32),
        S::F64 => Ok(DType::F64),
        S::F16 => Ok(DType::F16),
        S::BF16 => Ok(DType::BF16),
        other => anyhow::bail!("Unsupported weight dtype: {other:?}"),
    }
}
