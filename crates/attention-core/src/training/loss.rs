//! Masked regression loss and metrics.

use candle_core::{Result, Tensor, D};

/// Huber transition point.
pub const HUBER_DELTA: f64 = 1.0;

/// Huber loss of `pred` vs `target` (both `(B,)`), each sample weighted by
/// the fraction of unmasked frames in `mask` `(B, N)` and normalised by the
/// total weight.
///
/// A batch whose mask is entirely 0 yields a loss of exactly 0 with zero
/// gradients.
pub fn masked_huber(pred: &Tensor, target: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let weight = mask.mean(D::Minus1)?;
    let total = weight.sum_all()?.to_scalar::<f32>()?;

    let abs = (pred - target)?.abs()?;
    let quadratic = abs.minimum(HUBER_DELTA)?;
    let linear = (&abs - &quadratic)?;
    let per_sample = (quadratic.sqr()?.affine(0.5, 0.0)? + linear.affine(HUBER_DELTA, 0.0)?)?;

    (per_sample * weight)?
        .sum_all()?
        .affine(1.0 / f64::from(total.max(1e-8)), 0.0)
}

/// Mean absolute error of `pred` vs `target`.
pub fn mean_absolute_error(pred: &Tensor, target: &Tensor) -> Result<f32> {
    (pred - target)?.abs()?.mean_all()?.to_scalar::<f32>()
}
