//! Per-frame feature extraction.
//!
//! Turns a facial landmark set into the geometric attention cues:
//! - eye aspect ratio (EAR) averaged over both eyes, mapped to openness
//! - iris offset from the eye centre, normalised by eye width, mapped to
//!   gaze centring

use std::sync::Arc;

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use image::{imageops::FilterType, DynamicImage};
use tracing::debug;

use crate::domain::{BoundingBox, EyeLandmarks, FaceLandmarks, FrameFeatures, Point};
use crate::ports::LandmarkDetector;

/// Guards the EAR denominator against a zero-width eye.
const EAR_EPSILON: f32 = 1e-6;
/// EAR at or below which the eye counts as closed.
const EAR_CLOSED: f32 = 0.15;
/// EAR at or above which the eye counts as fully open.
const EAR_OPEN: f32 = 0.25;
/// Gaze deviation is scaled by this before being subtracted from 1.
const GAZE_PENALTY: f32 = 2.0;

/// Fraction of the face box added on each side before cropping.
pub const CROP_PADDING: f32 = 0.2;

/// Extracts [`FrameFeatures`] from decoded frames using a landmark detector.
#[derive(Clone)]
pub struct FeatureExtractor {
    detector: Arc<dyn LandmarkDetector>,
}

impl FeatureExtractor {
    /// Creates an extractor backed by `detector`.
    #[must_use]
    pub fn new(detector: Arc<dyn LandmarkDetector>) -> Self {
        Self { detector }
    }

    /// Whether the underlying detector is loaded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.detector.is_ready()
    }

    /// Extracts features from one frame.
    ///
    /// A frame without a face yields [`FrameFeatures::no_face`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the detector fails.
    pub fn extract(&self, image: &DynamicImage) -> Result<FrameFeatures> {
        let landmarks = self
            .detector
            .detect(image)
            .with_context(|| format!("{} landmark detection failed", self.detector.name()))?;

        Ok(landmarks.map_or_else(
            || {
                debug!("No face in frame");
                FrameFeatures::no_face()
            },
            |lm| features_from_landmarks(&lm),
        ))
    }
}

fn distance(a: Point, b: Point) -> f32 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

/// Eye aspect ratio: mean vertical opening over horizontal width.
#[must_use]
pub fn eye_aspect_ratio(eye: &EyeLandmarks) -> f32 {
    let p = &eye.contour;
    let vertical = (distance(p[1], p[5]) + distance(p[2], p[4])) / 2.0;
    let horizontal = distance(p[0], p[3]) + EAR_EPSILON;
    vertical / horizontal
}

/// Iris offset from the contour centroid, in eye widths.
#[must_use]
pub fn iris_offset(eye: &EyeLandmarks) -> [f32; 2] {
    #[allow(clippy::cast_precision_loss)]
    let n = eye.contour.len() as f32;
    let (sx, sy) = eye
        .contour
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    let centre = [sx / n, sy / n];

    let mut width = distance(eye.contour[0], eye.contour[3]);
    if width <= 0.0 {
        width = 1.0;
    }
    [
        (eye.iris[0] - centre[0]) / width,
        (eye.iris[1] - centre[1]) / width,
    ]
}

/// Maps an EAR to eye openness in `[0, 1]`.
#[must_use]
pub fn eye_openness(ear: f32) -> f32 {
    ((ear - EAR_CLOSED) / (EAR_OPEN - EAR_CLOSED)).clamp(0.0, 1.0)
}

/// Maps a gaze deviation to gaze centring in `[0, 1]`.
#[must_use]
pub fn gaze_center(deviation: f32) -> f32 {
    (1.0 - GAZE_PENALTY * deviation).clamp(0.0, 1.0)
}

/// Computes the attention cues of a face.
#[must_use]
pub fn features_from_landmarks(landmarks: &FaceLandmarks) -> FrameFeatures {
    let ear = (eye_aspect_ratio(&landmarks.left_eye) + eye_aspect_ratio(&landmarks.right_eye)) / 2.0;

    let left = iris_offset(&landmarks.left_eye);
    let right = iris_offset(&landmarks.right_eye);
    let offset = [(left[0] + right[0]) / 2.0, (left[1] + right[1]) / 2.0];
    let deviation = offset[0].hypot(offset[1]);

    FrameFeatures {
        face_present: true,
        eye_aspect_ratio: ear,
        eye_openness: eye_openness(ear),
        gaze_center: gaze_center(deviation),
        gaze_deviation: deviation,
        gaze_offset: offset,
        bounding_box: BoundingBox::enclosing(landmarks.points()),
    }
}

/// Cuts the padded face box out of `image` and resizes it to `size`×`size` RGB.
///
/// Returns `None` when the clipped box is empty.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn face_crop(image: &DynamicImage, bbox: &BoundingBox, size: u32) -> Option<DynamicImage> {
    let padded = bbox.padded(CROP_PADDING, image.width() as f32, image.height() as f32);
    let x = padded.x0.floor() as u32;
    let y = padded.y0.floor() as u32;
    let w = (padded.x1.ceil() as u32).saturating_sub(x);
    let h = (padded.y1.ceil() as u32).saturating_sub(y);
    if w == 0 || h == 0 {
        return None;
    }
    let crop = image.crop_imm(x, y, w, h);
    Some(DynamicImage::ImageRgb8(
        crop.resize_exact(size, size, FilterType::Triangle).to_rgb8(),
    ))
}

/// Converts an image to a `(3, size, size)` CPU tensor scaled to `[0, 1]`.
///
/// Images of another size are resized first.
///
/// # Errors
///
/// Returns an error if tensor creation fails.
pub fn image_to_chw(image: &DynamicImage, size: u32) -> Result<Tensor> {
    let rgb = if image.width() == size && image.height() == size {
        image.to_rgb8()
    } else {
        image.resize_exact(size, size, FilterType::Triangle).to_rgb8()
    };
    let side = size as usize;
    let data: Vec<f32> = rgb.into_raw().into_iter().map(|v| f32::from(v) / 255.0).collect();

    Tensor::from_vec(data, (side, side, 3), &Device::Cpu)?
        .permute((2, 0, 1))?
        .contiguous()
        .context("Failed to build frame tensor")
}
