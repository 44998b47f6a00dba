//! Eye-landmark regressor.
//!
//! Second stage of landmark detection. A small CNN reads a grayscale crop
//! around one eye centre and regresses seven points in crop-normalised
//! coordinates: the six contour points followed by the iris centre.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

use anyhow::{Context, Result};
use candle_core::{Device, Module, Tensor};
use candle_nn::{conv2d, linear, Conv2d, Conv2dConfig, Linear, VarBuilder};
use image::{imageops::FilterType, DynamicImage};

use crate::domain::{EyeLandmarks, Point};

/// Crop width fed to the network.
pub const EYE_WIDTH: usize = 34;
/// Crop height fed to the network.
pub const EYE_HEIGHT: usize = 26;

/// Regressed points per eye.
const POINTS: usize = 7;

/// Eye crop width as a fraction of face width.
const REGION_WIDTH_RATIO: f32 = 0.3;
/// Eye crop height as a fraction of face height.
const REGION_HEIGHT_RATIO: f32 = 0.2;

/// Pixel rectangle of an eye crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeRegion {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width, at least 1.
    pub width: u32,
    /// Height, at least 1.
    pub height: u32,
}

impl EyeRegion {
    /// Region centred on `eye` (normalised) sized from the face box (normalised),
    /// clipped to a `image_w`×`image_h` image.
    #[must_use]
    pub fn around(eye: Point, face_bbox: &[f32; 4], image_w: u32, image_h: u32) -> Self {
        let (iw, ih) = (image_w as f32, image_h as f32);
        let w = (face_bbox[2] - face_bbox[0]) * REGION_WIDTH_RATIO * iw;
        let h = (face_bbox[3] - face_bbox[1]) * REGION_HEIGHT_RATIO * ih;

        let x = ((eye[0] * iw - w / 2.0).max(0.0) as u32).min(image_w.saturating_sub(1));
        let y = ((eye[1] * ih - h / 2.0).max(0.0) as u32).min(image_h.saturating_sub(1));
        let width = (w as u32).min(image_w - x).max(1);
        let height = (h as u32).min(image_h - y).max(1);

        Self { x, y, width, height }
    }

    /// Maps a crop-normalised point back to image pixels.
    #[must_use]
    pub fn to_image(&self, p: Point) -> Point {
        [
            (self.width as f32).mul_add(p[0], self.x as f32),
            (self.height as f32).mul_add(p[1], self.y as f32),
        ]
    }
}

/// Regresses contour and iris points for one eye.
///
/// Architecture: three conv/ReLU/max-pool stages (1→32→64→128 channels),
/// then `Linear(1536→256) → ReLU → Linear(256→14) → sigmoid`.
pub struct EyeLandmarkRegressor {
    conv1: Conv2d,
    conv2: Conv2d,
    conv3: Conv2d,
    fc1: Linear,
    fc2: Linear,
    device: Device,
}

impl EyeLandmarkRegressor {
    /// Builds the network from weights.
    ///
    /// # Errors
    ///
    /// Returns an error if a tensor is missing or has the wrong shape.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let same = Conv2dConfig {
            padding: 1,
            ..Conv2dConfig::default()
        };

        // 34x26 -> 17x13 -> 8x6 -> 4x3 after three 2x2 pools
        Ok(Self {
            conv1: conv2d(1, 32, 3, same, vb.pp("conv1"))?,
            conv2: conv2d(32, 64, 3, same, vb.pp("conv2"))?,
            conv3: conv2d(64, 128, 3, same, vb.pp("conv3"))?,
            fc1: linear(128 * 4 * 3, 256, vb.pp("fc1"))?,
            fc2: linear(256, POINTS * 2, vb.pp("fc2"))?,
            device: vb.device().clone(),
        })
    }

    fn preprocess(&self, image: &DynamicImage, region: EyeRegion) -> Result<Tensor> {
        let gray = image
            .crop_imm(region.x, region.y, region.width, region.height)
            .resize_exact(EYE_WIDTH as u32, EYE_HEIGHT as u32, FilterType::Triangle)
            .to_luma8();
        let data: Vec<f32> = gray.into_raw().into_iter().map(|v| f32::from(v) / 255.0).collect();

        Tensor::from_vec(data, (1, 1, EYE_HEIGHT, EYE_WIDTH), &self.device)
            .context("Failed to create eye tensor")
    }

    /// Locates the landmarks of the eye inside `region`, in image pixels.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    pub fn locate(&self, image: &DynamicImage, region: EyeRegion) -> Result<EyeLandmarks> {
        let input = self.preprocess(image, region)?;
        let out = candle_nn::ops::sigmoid(&self.forward(&input)?)?
            .squeeze(0)?
            .to_vec1::<f32>()?;
        points_to_landmarks(&out, region)
    }
}

fn points_to_landmarks(raw: &[f32], region: EyeRegion) -> Result<EyeLandmarks> {
    anyhow::ensure!(
        raw.len() == POINTS * 2,
        "expected {} eye coordinates, got {}",
        POINTS * 2,
        raw.len()
    );
    let pt = |i: usize| region.to_image([raw[2 * i], raw[2 * i + 1]]);

    Ok(EyeLandmarks {
        contour: [pt(0), pt(1), pt(2), pt(3), pt(4), pt(5)],
        iris: pt(6),
    })
}

impl Module for EyeLandmarkRegressor {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let x = self.conv1.forward(x)?.relu()?.max_pool2d(2)?;
        let x = self.conv2.forward(&x)?.relu()?.max_pool2d(2)?;
        let x = self.conv3.forward(&x)?.relu()?.max_pool2d(2)?;
        let x = self.fc1.forward(&x.flatten_from(1)?)?.relu()?;
        self.fc2.forward(&x)
    }
}
