//! `BlazeFace` short-range face detector.
//!
//! First stage of landmark detection: finds the face box and six coarse
//! keypoints, whose eye centres seed the eye-landmark regressor. Weights are
//! the hollance/BlazeFace-PyTorch export with batch norm folded into the
//! convolution biases.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use candle_core::{Device, Module, Tensor};
use candle_nn::{conv2d, Conv2d, Conv2dConfig, VarBuilder};
use image::{imageops::FilterType, DynamicImage};

use super::sigmoid;
use crate::domain::Point;

/// Square input resolution.
pub const INPUT_SIZE: usize = 128;

const NUM_ANCHORS: usize = 896;
const ANCHORS_16: usize = 512;
const ANCHORS_8: usize = 384;

/// Raw scores below this never reach suppression.
const SCORE_FLOOR: f32 = 0.5;
const NMS_THRESHOLD: f32 = 0.3;

/// `(in, out, stride)` of each block; every block uses a 3×3 depthwise kernel.
const BACKBONE_16: [(usize, usize, usize); 11] = [
    (24, 24, 1),
    (24, 28, 1),
    (28, 32, 2),
    (32, 36, 1),
    (36, 42, 1),
    (42, 48, 2),
    (48, 56, 1),
    (56, 64, 1),
    (64, 72, 1),
    (72, 80, 1),
    (80, 88, 1),
];
const BACKBONE_8: [(usize, usize, usize); 5] = [
    (88, 96, 2),
    (96, 96, 1),
    (96, 96, 1),
    (96, 96, 1),
    (96, 96, 1),
];

/// One detected face in normalised `[0, 1]` image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    /// `[x_min, y_min, x_max, y_max]`.
    pub bbox: [f32; 4],
    /// Detection confidence.
    pub score: f32,
    /// Subject's right eye, left eye, nose, mouth, right ear, left ear.
    pub keypoints: [Point; 6],
}

impl FaceDetection {
    /// Subject's right eye centre (image left).
    #[must_use]
    pub const fn right_eye(&self) -> Point {
        self.keypoints[0]
    }

    /// Subject's left eye centre (image right).
    #[must_use]
    pub const fn left_eye(&self) -> Point {
        self.keypoints[1]
    }

    /// Box corners and keypoints scaled to a `width`×`height` image.
    #[must_use]
    pub fn face_points_px(&self, width: f32, height: f32) -> Vec<Point> {
        let [x0, y0, x1, y1] = self.bbox;
        [[x0, y0], [x1, y1]]
            .into_iter()
            .chain(self.keypoints[2..].iter().copied())
            .map(|[x, y]| [x * width, y * height])
            .collect()
    }
}

struct BlazeBlock {
    depthwise: Conv2d,
    pointwise: Conv2d,
    channel_pad: usize,
    stride: usize,
}

impl BlazeBlock {
    fn new(in_channels: usize, out_channels: usize, stride: usize, vb: &VarBuilder) -> Result<Self> {
        let depthwise = conv2d(
            in_channels,
            in_channels,
            3,
            Conv2dConfig {
                stride,
                padding: usize::from(stride == 1),
                groups: in_channels,
                ..Conv2dConfig::default()
            },
            vb.pp("depthwise"),
        )?;
        let pointwise = conv2d(
            in_channels,
            out_channels,
            1,
            Conv2dConfig::default(),
            vb.pp("pointwise"),
        )?;

        Ok(Self {
            depthwise,
            pointwise,
            channel_pad: out_channels.saturating_sub(in_channels),
            stride,
        })
    }
}

impl Module for BlazeBlock {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let (input, residual) = if self.stride == 2 {
            (
                x.pad_with_zeros(2, 0, 2)?.pad_with_zeros(3, 0, 2)?,
                x.max_pool2d(2)?,
            )
        } else {
            (x.clone(), x.clone())
        };

        let h = self.depthwise.forward(&input)?.relu()?;
        let h = self.pointwise.forward(&h)?;

        let residual = if self.channel_pad > 0 {
            residual.pad_with_zeros(1, 0, self.channel_pad)?
        } else {
            residual
        };
        (h + residual)?.relu()
    }
}

/// The `BlazeFace` network plus anchor decoding.
pub struct BlazeFace {
    conv0: Conv2d,
    backbone16: Vec<BlazeBlock>,
    backbone8: Vec<BlazeBlock>,
    classifier_16: Conv2d,
    regressor_16: Conv2d,
    classifier_8: Conv2d,
    regressor_8: Conv2d,
    anchors: Vec<Point>,
    device: Device,
}

impl BlazeFace {
    /// Builds the network from weights.
    ///
    /// # Errors
    ///
    /// Returns an error if a tensor is missing or has the wrong shape.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let conv0 = conv2d(
            3,
            24,
            5,
            Conv2dConfig {
                stride: 2,
                ..Conv2dConfig::default()
            },
            vb.pp("conv0"),
        )?;

        let backbone16 = BACKBONE_16
            .iter()
            .enumerate()
            .map(|(i, &(c_in, c_out, s))| BlazeBlock::new(c_in, c_out, s, &vb.pp(format!("backbone1.{i}"))))
            .collect::<Result<Vec<_>>>()?;
        let backbone8 = BACKBONE_8
            .iter()
            .enumerate()
            .map(|(i, &(c_in, c_out, s))| BlazeBlock::new(c_in, c_out, s, &vb.pp(format!("backbone2.{i}"))))
            .collect::<Result<Vec<_>>>()?;

        let head = |c_in, c_out, name: &str| conv2d(c_in, c_out, 1, Conv2dConfig::default(), vb.pp(name));

        Ok(Self {
            conv0,
            backbone16,
            backbone8,
            classifier_16: head(88, 2, "classifier_16")?,
            regressor_16: head(88, 32, "regressor_16")?,
            classifier_8: head(96, 6, "classifier_8")?,
            regressor_8: head(96, 96, "regressor_8")?,
            anchors: anchor_centres(),
            device: vb.device().clone(),
        })
    }

    /// Resizes to 128×128 RGB, scales to `[-1, 1]`, NCHW.
    fn preprocess(&self, image: &DynamicImage) -> Result<Tensor> {
        let rgb = image
            .resize_exact(INPUT_SIZE as u32, INPUT_SIZE as u32, FilterType::Triangle)
            .to_rgb8();
        let data: Vec<f32> = rgb
            .into_raw()
            .into_iter()
            .map(|v| f32::from(v) / 127.5 - 1.0)
            .collect();

        Tensor::from_vec(data, (1, INPUT_SIZE, INPUT_SIZE, 3), &self.device)?
            .permute((0, 3, 1, 2))?
            .contiguous()
            .context("Failed to preprocess image")
    }

    fn forward(&self, x: &Tensor) -> Result<(Tensor, Tensor)> {
        let x = x.pad_with_zeros(2, 1, 2)?.pad_with_zeros(3, 1, 2)?;
        let mut h = self.conv0.forward(&x)?.relu()?;
        for block in &self.backbone16 {
            h = block.forward(&h)?;
        }
        let f16 = h.clone();
        for block in &self.backbone8 {
            h = block.forward(&h)?;
        }

        let flat = |t: Tensor, n: usize, d: usize| t.permute((0, 2, 3, 1))?.reshape((1, n, d));
        let scores = Tensor::cat(
            &[
                flat(self.classifier_16.forward(&f16)?, ANCHORS_16, 1)?,
                flat(self.classifier_8.forward(&h)?, ANCHORS_8, 1)?,
            ],
            1,
        )?;
        let boxes = Tensor::cat(
            &[
                flat(self.regressor_16.forward(&f16)?, ANCHORS_16, 16)?,
                flat(self.regressor_8.forward(&h)?, ANCHORS_8, 16)?,
            ],
            1,
        )?;
        Ok((scores, boxes))
    }

    /// Detects faces, most confident first, after non-maximum suppression.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceDetection>> {
        let (scores, boxes) = self.forward(&self.preprocess(image)?)?;
        let scores = scores.squeeze(0)?.squeeze(1)?.to_vec1::<f32>()?;
        let boxes = boxes.squeeze(0)?.to_vec2::<f32>()?;

        let detections = scores
            .iter()
            .zip(&boxes)
            .zip(&self.anchors)
            .filter_map(|((&logit, raw), anchor)| {
                let score = sigmoid(logit);
                (score >= SCORE_FLOOR).then(|| decode(anchor, raw, score))
            })
            .collect();
        Ok(nms(detections))
    }
}

/// Anchor centres for the 16×16 (2 per cell) and 8×8 (6 per cell) grids.
fn anchor_centres() -> Vec<Point> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (grid, per_cell) in [(16_u8, 2), (8_u8, 6)] {
        let size = f32::from(grid);
        for y in 0..grid {
            for x in 0..grid {
                let centre = [(f32::from(x) + 0.5) / size, (f32::from(y) + 0.5) / size];
                anchors.extend(std::iter::repeat(centre).take(per_cell));
            }
        }
    }
    anchors
}

fn decode(anchor: &Point, raw: &[f32], score: f32) -> FaceDetection {
    let scale = INPUT_SIZE as f32;
    let cx = anchor[0] + raw[0] / scale;
    let cy = anchor[1] + raw[1] / scale;
    let (w, h) = (raw[2] / scale, raw[3] / scale);

    let mut keypoints = [[0.0_f32; 2]; 6];
    for (k, kp) in keypoints.iter_mut().enumerate() {
        *kp = [
            (anchor[0] + raw[4 + 2 * k] / scale).clamp(0.0, 1.0),
            (anchor[1] + raw[5 + 2 * k] / scale).clamp(0.0, 1.0),
        ];
    }

    FaceDetection {
        bbox: [
            (cx - w / 2.0).clamp(0.0, 1.0),
            (cy - h / 2.0).clamp(0.0, 1.0),
            (cx + w / 2.0).clamp(0.0, 1.0),
            (cy + h / 2.0).clamp(0.0, 1.0),
        ],
        score,
        keypoints,
    }
}

fn nms(mut detections: Vec<FaceDetection>) -> Vec<FaceDetection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<FaceDetection> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(&k.bbox, &det.bbox) < NMS_THRESHOLD) {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = inter_w * inter_h;
    let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
