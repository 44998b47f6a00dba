//! Landmark detector port.

use image::DynamicImage;

use crate::domain::FaceLandmarks;

/// Port for facial landmark detection.
pub trait LandmarkDetector: Send + Sync {
    /// Returns a short name for logs.
    fn name(&self) -> &'static str;

    /// Detects the most prominent face.
    ///
    /// `Ok(None)` means no face was found, which is a normal outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the detector itself fails (weights missing,
    /// inference error).
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<Option<FaceLandmarks>>;

    /// Whether the detector is ready without further loading.
    fn is_ready(&self) -> bool {
        true
    }
}
