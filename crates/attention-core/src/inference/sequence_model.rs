//! CNN + LSTM sequence model scoring a window of face crops.

use anyhow::Result;
use candle_core::{Module, Tensor};
use candle_nn::{conv2d, linear, lstm, Conv2d, Conv2dConfig, LSTMConfig, Linear, VarBuilder, LSTM, RNN};
use serde::{Deserialize, Serialize};

/// Channels after the per-frame CNN.
const FRAME_FEATURES: usize = 16;
/// LSTM hidden size.
const HIDDEN: usize = 32;
/// Width of the regression head's hidden layer.
const HEAD_HIDDEN: usize = 16;

/// Fixed input shape `(N, C, H, W)` of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceShape {
    /// Frames per window (N).
    pub seq_len: usize,
    /// Colour channels.
    pub channels: usize,
    /// Crop height.
    pub height: usize,
    /// Crop width.
    pub width: usize,
}

impl SequenceShape {
    /// RGB square crops of side `image_size`.
    #[must_use]
    pub const fn rgb(seq_len: usize, image_size: usize) -> Self {
        Self {
            seq_len,
            channels: 3,
            height: image_size,
            width: image_size,
        }
    }

    /// Shape of one frame, `(C, H, W)`.
    #[must_use]
    pub const fn frame_dims(&self) -> (usize, usize, usize) {
        (self.channels, self.height, self.width)
    }
}

/// Per-frame `conv(C→8, s2) → ReLU → conv(8→16, s2) → ReLU → GAP`, an
/// LSTM over the frame features, and `Linear(32→16) → ReLU → Linear(16→1) → sigmoid`
/// on the last hidden state.
pub struct AttentionSequenceModel {
    conv1: Conv2d,
    conv2: Conv2d,
    lstm: LSTM,
    head1: Linear,
    head2: Linear,
    shape: SequenceShape,
}

impl AttentionSequenceModel {
    /// Name recorded in artifact manifests.
    pub const ARCHITECTURE: &'static str = "cnn-lstm-v1";

    /// Builds the model. With a `VarMap`-backed builder this initialises
    /// fresh weights; with loaded tensors it restores them.
    ///
    /// # Errors
    ///
    /// Returns an error if a tensor is missing or has the wrong shape.
    pub fn new(shape: SequenceShape, vb: &VarBuilder) -> Result<Self> {
        let down = Conv2dConfig {
            padding: 1,
            stride: 2,
            ..Conv2dConfig::default()
        };

        Ok(Self {
            conv1: conv2d(shape.channels, 8, 3, down, vb.pp("conv1"))?,
            conv2: conv2d(8, FRAME_FEATURES, 3, down, vb.pp("conv2"))?,
            lstm: lstm(FRAME_FEATURES, HIDDEN, LSTMConfig::default(), vb.pp("lstm"))?,
            head1: linear(HIDDEN, HEAD_HIDDEN, vb.pp("head1"))?,
            head2: linear(HEAD_HIDDEN, 1, vb.pp("head2"))?,
            shape,
        })
    }

    /// Input shape the model was built for.
    #[must_use]
    pub const fn shape(&self) -> SequenceShape {
        self.shape
    }
}

impl Module for AttentionSequenceModel {
    /// `(B, N, C, H, W)` → `(B,)` scores in `(0, 1)`.
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let (b, n, c, h, w) = x.dims5()?;

        let frames = x.reshape((b * n, c, h, w))?;
        let f = self.conv1.forward(&frames)?.relu()?;
        let f = self.conv2.forward(&f)?.relu()?;
        let f = f.mean((2, 3))?.reshape((b, n, FRAME_FEATURES))?;

        let states = self.lstm.seq(&f)?;
        let last = states
            .last()
            .ok_or_else(|| candle_core::Error::Msg("empty frame sequence".to_string()))?;

        let y = self.head1.forward(last.h())?.relu()?;
        let y = self.head2.forward(&y)?;
        candle_nn::ops::sigmoid(&y)?.squeeze(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_forward_shape_and_range() -> Result<()> {
        let shape = SequenceShape::rgb(4, 16);
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = AttentionSequenceModel::new(shape, &vb)?;

        let x = Tensor::rand(0f32, 1f32, (3, 4, 3, 16, 16), &Device::Cpu)?;
        let y = model.forward(&x)?;
        assert_eq!(y.dims(), &[3]);
        for v in y.to_vec1::<f32>()? {
            assert!((0.0..=1.0).contains(&v));
        }
        Ok(())
    }

    #[test]
    fn test_rejects_wrong_rank() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = AttentionSequenceModel::new(SequenceShape::rgb(4, 16), &vb)?;
        let x = Tensor::zeros((4, 3, 16, 16), DType::F32, &Device::Cpu)?;
        assert!(model.forward(&x).is_err());
        Ok(())
    }
}
