//! Synthetic fixtures.

use std::io::Cursor;

use attention_core::domain::{
    DiagnosticResult, EyeLandmarks, FaceLandmarks, PhaseData, PhaseRecord, PhaseSummary, RawEvent,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::json;
use time::{Duration, OffsetDateTime};

/// Builder for landmark sets with known geometry.
///
/// Eyes are 20 px wide; an "open" eye has an aspect ratio of 0.3 and a
/// "closed" one 0.05.
pub struct SyntheticLandmarks;

impl SyntheticLandmarks {
    fn eye(cx: f32, cy: f32, half_open: f32, iris_dx: f32) -> EyeLandmarks {
        EyeLandmarks {
            contour: [
                [cx - 10.0, cy],
                [cx - 4.0, cy - half_open],
                [cx + 4.0, cy - half_open],
                [cx + 10.0, cy],
                [cx + 4.0, cy + half_open],
                [cx - 4.0, cy + half_open],
            ],
            iris: [cx + iris_dx, cy],
        }
    }

    /// Face with the given eye opening (half-height, px) and horizontal iris shift.
    #[must_use]
    pub fn face(half_open: f32, iris_dx: f32) -> FaceLandmarks {
        FaceLandmarks {
            left_eye: Self::eye(84.0, 60.0, half_open, iris_dx),
            right_eye: Self::eye(44.0, 60.0, half_open, iris_dx),
            face_points: vec![[64.0, 80.0], [64.0, 96.0], [30.0, 40.0], [98.0, 110.0]],
            confidence: 0.95,
        }
    }

    /// Eyes open, looking straight at the camera.
    #[must_use]
    pub fn attentive() -> FaceLandmarks {
        Self::face(3.0, 0.0)
    }

    /// Eyes closed, looking straight ahead.
    #[must_use]
    pub fn eyes_closed() -> FaceLandmarks {
        Self::face(0.5, 0.0)
    }

    /// Eyes open, iris half an eye-width to the side.
    #[must_use]
    pub fn looking_away() -> FaceLandmarks {
        Self::face(3.0, 10.0)
    }
}

/// Builder for synthetic frames.
pub struct SyntheticImageBuilder;

impl SyntheticImageBuilder {
    /// Uniform RGB frame.
    #[must_use]
    pub fn uniform(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    /// 128×128 gray frame, large enough for every synthetic landmark set.
    #[must_use]
    pub fn frame() -> DynamicImage {
        Self::uniform(128, 128, [128, 128, 128])
    }

    /// Encodes `image` in `format`.
    ///
    /// # Panics
    ///
    /// Panics if encoding fails, which only happens for unsupported formats.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, format).expect("encode synthetic image");
        buf.into_inner()
    }

    /// JPEG bytes of [`Self::frame`], as a capture client would upload.
    #[must_use]
    pub fn jpeg_frame() -> Vec<u8> {
        Self::encode(&Self::frame(), ImageFormat::Jpeg)
    }
}

/// Builder for persisted backend records.
pub struct RecordBuilder;

impl RecordBuilder {
    /// Reference capture time used by [`Self::events`].
    #[must_use]
    pub const fn epoch() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH
    }

    /// A diagnostic result with one phase per `(phase, hits, errors, omissions)`.
    /// Each phase lasts 60 s.
    #[must_use]
    pub fn result(session_id: i64, user_id: i64, phases: &[(i64, f64, f64, f64)]) -> DiagnosticResult {
        let phases = phases
            .iter()
            .enumerate()
            .map(|(i, &(phase, hits, errors, omissions))| {
                #[allow(clippy::cast_precision_loss)]
                let start = 1_000.0 + i as f64 * 60_000.0;
                PhaseRecord {
                    phase,
                    start: Some(start),
                    end: Some(start + 60_000.0),
                    summary: PhaseSummary {
                        hits,
                        errors,
                        omissions,
                    },
                }
            })
            .collect();
        DiagnosticResult {
            session_id,
            user_id,
            phase_data: PhaseData { phases },
        }
    }

    /// One stored per-frame event as the serving path emits it.
    #[must_use]
    pub fn event(
        session_id: i64,
        user_id: i64,
        phase: i64,
        index: i64,
        spinning: bool,
        frame_path: Option<&str>,
    ) -> RawEvent {
        let mut frame = json!({
            "face": true,
            "ear": 0.3,
            "eyes_open": 1.0,
            "gaze_center": 0.9,
            "gaze_deviation": 0.05,
            "gaze_offset": [0.03, 0.04],
        });
        if let (Some(path), Some(obj)) = (frame_path, frame.as_object_mut()) {
            obj.insert("frame_path".to_string(), json!(path));
        }
        RawEvent {
            session_id,
            user_id,
            timestamp: Self::epoch() + Duration::milliseconds(index * 100),
            value: Some(0.8),
            label: "attention_sequence_score".to_string(),
            data: json!({
                "frame": frame,
                "temporal": {
                    "sequence_len": 16,
                    "frame_score": 0.86,
                    "temporal_mean": 0.8,
                    "eyes_mean": 0.9,
                    "gaze_mean": 0.85,
                },
                "context": { "phase": phase, "spinning": u8::from(spinning) },
            }),
        }
    }

    /// `count` consecutive events of one phase; every `spin_every`-th is a
    /// distractor frame (0 disables) and frame paths are `frames/<i>.jpg`.
    #[must_use]
    pub fn events(session_id: i64, user_id: i64, phase: i64, count: usize, spin_every: usize) -> Vec<RawEvent> {
        (0..count)
            .map(|i| {
                let spinning = spin_every > 0 && i % spin_every == spin_every - 1;
                let path = format!("frames/{i}.jpg");
                #[allow(clippy::cast_possible_wrap)]
                Self::event(session_id, user_id, phase, i as i64, spinning, Some(&path))
            })
            .collect()
    }
}
