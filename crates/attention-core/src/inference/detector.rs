//! Production landmark detector: `BlazeFace` followed by the eye regressor.

#![allow(clippy::cast_precision_loss)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::Device;
use image::DynamicImage;
use tracing::debug;

use super::{BlazeFace, EyeLandmarkRegressor, EyeRegion, LazyModel};
use crate::domain::FaceLandmarks;
use crate::ports::LandmarkDetector;

/// Default minimum `BlazeFace` confidence for a face to count.
pub const DEFAULT_MIN_FACE_CONFIDENCE: f32 = 0.75;

/// Weight locations and thresholds for [`CandleLandmarkDetector`].
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// `BlazeFace` weights.
    pub blazeface_path: PathBuf,
    /// Eye-landmark regressor weights.
    pub eye_landmarks_path: PathBuf,
    /// Faces scored below this are ignored.
    pub min_face_confidence: f32,
}

impl DetectorConfig {
    /// Config with the default confidence threshold.
    #[must_use]
    pub fn new(blazeface_path: impl Into<PathBuf>, eye_landmarks_path: impl Into<PathBuf>) -> Self {
        Self {
            blazeface_path: blazeface_path.into(),
            eye_landmarks_path: eye_landmarks_path.into(),
            min_face_confidence: DEFAULT_MIN_FACE_CONFIDENCE,
        }
    }
}

/// Two-stage candle detector. Weights load on the first frame.
pub struct CandleLandmarkDetector {
    min_face_confidence: f32,
    blazeface: LazyModel<BlazeFace>,
    eyes: LazyModel<EyeLandmarkRegressor>,
}

impl CandleLandmarkDetector {
    /// Creates the detector without touching the weight files.
    #[must_use]
    pub fn new(config: &DetectorConfig, device: &Device) -> Self {
        Self {
            min_face_confidence: config.min_face_confidence,
            blazeface: LazyModel::new(&config.blazeface_path, device.clone(), BlazeFace::new),
            eyes: LazyModel::new(
                &config.eye_landmarks_path,
                device.clone(),
                EyeLandmarkRegressor::new,
            ),
        }
    }

    /// Loads both networks now instead of on the first frame.
    ///
    /// # Errors
    ///
    /// Returns an error if either weights file is missing or invalid.
    pub fn warm_up(&self) -> Result<()> {
        self.networks().map(|_| ())
    }

    fn networks(&self) -> Result<(&BlazeFace, &EyeLandmarkRegressor)> {
        let blazeface = self.blazeface.get().with_context(|| {
            format!("BlazeFace weights unavailable at {}", self.blazeface.path().display())
        })?;
        let eyes = self.eyes.get().with_context(|| {
            format!("Eye landmark weights unavailable at {}", self.eyes.path().display())
        })?;
        Ok((blazeface, eyes))
    }
}

impl LandmarkDetector for CandleLandmarkDetector {
    fn name(&self) -> &'static str {
        "blazeface+eye-landmarks"
    }

    fn detect(&self, image: &DynamicImage) -> Result<Option<FaceLandmarks>> {
        let (blazeface, eyes) = self.networks()?;

        let detections = blazeface.detect(image).context("Face detection failed")?;
        let Some(face) = detections
            .into_iter()
            .find(|d| d.score >= self.min_face_confidence)
        else {
            return Ok(None);
        };
        debug!(score = face.score, "Face detected");

        let (w, h) = (image.width(), image.height());
        let locate = |centre| eyes.locate(image, EyeRegion::around(centre, &face.bbox, w, h));

        Ok(Some(FaceLandmarks {
            left_eye: locate(face.left_eye()).context("Left eye regression failed")?,
            right_eye: locate(face.right_eye()).context("Right eye regression failed")?,
            face_points: face.face_points_px(w as f32, h as f32),
            confidence: face.score,
        }))
    }

    fn is_ready(&self) -> bool {
        self.blazeface.is_loaded() && self.eyes.is_loaded()
    }
}
