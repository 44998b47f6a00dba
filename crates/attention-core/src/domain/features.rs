//! Landmark and per-frame feature types.

use serde::{Deserialize, Serialize};

/// A 2D point in image pixel coordinates.
pub type Point = [f32; 2];

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x0: f32,
    /// Top edge.
    pub y0: f32,
    /// Right edge.
    pub x1: f32,
    /// Bottom edge.
    pub y1: f32,
}

impl BoundingBox {
    /// Smallest box containing every point, or `None` for an empty set.
    #[must_use]
    pub fn enclosing<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Self {
                    x0: p[0],
                    y0: p[1],
                    x1: p[0],
                    y1: p[1],
                },
                Some(b) => Self {
                    x0: b.x0.min(p[0]),
                    y0: b.y0.min(p[1]),
                    x1: b.x1.max(p[0]),
                    y1: b.y1.max(p[1]),
                },
            })
        })
    }

    /// Box width.
    #[must_use]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    /// Box height.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Grows each side by `ratio` of the box size and clips to `width`×`height`.
    #[must_use]
    pub fn padded(&self, ratio: f32, width: f32, height: f32) -> Self {
        let dx = self.width() * ratio;
        let dy = self.height() * ratio;
        Self {
            x0: (self.x0 - dx).clamp(0.0, width),
            y0: (self.y0 - dy).clamp(0.0, height),
            x1: (self.x1 + dx).clamp(0.0, width),
            y1: (self.y1 + dy).clamp(0.0, height),
        }
    }
}

/// Landmarks of a single eye.
///
/// Contour order: outer corner, upper-outer, upper-inner, inner corner,
/// lower-inner, lower-outer. Vertical pairs are (1,5) and (2,4); the
/// horizontal span is (0,3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeLandmarks {
    /// Six contour points.
    pub contour: [Point; 6],
    /// Iris centre.
    pub iris: Point,
}

/// Landmark set for one detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    /// Subject's left eye.
    pub left_eye: EyeLandmarks,
    /// Subject's right eye.
    pub right_eye: EyeLandmarks,
    /// Additional face points (nose, mouth, ears...) used only for the crop box.
    pub face_points: Vec<Point>,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
}

impl FaceLandmarks {
    /// Iterates every landmark point of the face.
    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.left_eye
            .contour
            .iter()
            .chain(std::iter::once(&self.left_eye.iris))
            .chain(self.right_eye.contour.iter())
            .chain(std::iter::once(&self.right_eye.iris))
            .chain(self.face_points.iter())
    }
}

/// Geometric attention cues derived from a single frame.
///
/// A frame without a detectable face is a normal outcome and is represented
/// by [`FrameFeatures::no_face`], with every cue at zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameFeatures {
    /// Whether a face was detected.
    #[serde(rename = "face")]
    pub face_present: bool,
    /// Mean eye aspect ratio of both eyes.
    #[serde(rename = "ear")]
    pub eye_aspect_ratio: f32,
    /// Eye aspect ratio mapped to `[0, 1]`.
    #[serde(rename = "eyes_open")]
    pub eye_openness: f32,
    /// Gaze centring in `[0, 1]`, 1 when looking straight at the camera.
    pub gaze_center: f32,
    /// Euclidean norm of [`Self::gaze_offset`].
    pub gaze_deviation: f32,
    /// Iris offset from eye centre, normalised by eye width.
    pub gaze_offset: [f32; 2],
    /// Face region derived from the landmark extrema.
    #[serde(rename = "bbox", skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

/// Weight of eye openness in the instantaneous score.
pub const EYES_WEIGHT: f32 = 0.5;
/// Weight of gaze centring in the instantaneous score.
pub const GAZE_WEIGHT: f32 = 0.4;
/// Weight of face presence in the instantaneous score.
pub const PRESENCE_WEIGHT: f32 = 0.1;

impl FrameFeatures {
    /// Features of a frame in which no face was found.
    #[must_use]
    pub const fn no_face() -> Self {
        Self {
            face_present: false,
            eye_aspect_ratio: 0.0,
            eye_openness: 0.0,
            gaze_center: 0.0,
            gaze_deviation: 0.0,
            gaze_offset: [0.0, 0.0],
            bounding_box: None,
        }
    }

    /// Instantaneous heuristic score of this frame in `[0, 1]`.
    #[must_use]
    pub fn instant_score(&self) -> f32 {
        if !self.face_present {
            return 0.0;
        }
        (EYES_WEIGHT * self.eye_openness + GAZE_WEIGHT * self.gaze_center + PRESENCE_WEIGHT)
            .clamp(0.0, 1.0)
    }
}
