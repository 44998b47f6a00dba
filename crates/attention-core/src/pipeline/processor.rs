//! One frame through extract → append → aggregate → infer → arbitrate.

use std::sync::Arc;

use anyhow::Result;
use image::DynamicImage;
use tracing::{debug, warn};

use super::{
    aggregate, arbitrate, face_crop, image_to_chw, FeatureExtractor, FeatureSample, ScoredFrame,
    SessionStore,
};
use crate::domain::{EventContext, SessionRef};
use crate::inference::{ModelOutcome, ModelRuntime, Unavailable};
use crate::ports::FrameArchive;

/// Online scoring pipeline shared by all requests.
pub struct AttentionPipeline {
    extractor: FeatureExtractor,
    store: Arc<SessionStore>,
    runtime: Arc<ModelRuntime>,
    archive: Option<Arc<dyn FrameArchive>>,
}

impl AttentionPipeline {
    /// Assembles the pipeline.
    #[must_use]
    pub fn new(extractor: FeatureExtractor, store: Arc<SessionStore>, runtime: Arc<ModelRuntime>) -> Self {
        Self {
            extractor,
            store,
            runtime,
            archive: None,
        }
    }

    /// Archives every face crop.
    #[must_use]
    pub fn with_archive(mut self, archive: Arc<dyn FrameArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Session windows.
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Model runtime.
    #[must_use]
    pub fn runtime(&self) -> &Arc<ModelRuntime> {
        &self.runtime
    }

    /// Whether the landmark detector is loaded.
    #[must_use]
    pub fn detector_ready(&self) -> bool {
        self.extractor.is_ready()
    }

    /// Scores one decoded frame of `session`.
    ///
    /// Holds the session lock for the whole computation, so frames of one
    /// session are processed in arrival order. CPU-bound; call from a
    /// blocking context.
    ///
    /// # Errors
    ///
    /// Returns an error only when the landmark detector fails.
    pub fn process(&self, session: SessionRef, image: &DynamicImage, context: &EventContext) -> Result<ScoredFrame> {
        let handle = self.store.session(session);
        let mut state = handle.lock();

        let features = self.extractor.extract(image)?;
        state.append_feature(FeatureSample::from(&features));

        let mut frame_path = None;
        if let Some(bbox) = features.bounding_box {
            let size = u32::try_from(self.runtime.shape().height).unwrap_or(u32::MAX);
            if let Some(crop) = face_crop(image, &bbox, size) {
                match image_to_chw(&crop, size) {
                    Ok(tensor) => state.append_frame(tensor),
                    Err(e) => warn!(%session, "Dropping face crop: {e:#}"),
                }
                frame_path = self.archive_crop(session, &crop);
            }
        }

        let temporal = aggregate(&state.features().to_vec());
        let model = if features.face_present {
            self.runtime.infer(&state.frames().to_vec(), context.spinning)
        } else {
            ModelOutcome::Unavailable(Unavailable::NoFace)
        };
        drop(state);

        let decision = arbitrate(features.face_present, &temporal, &model);
        debug!(
            %session,
            source = ?decision.source,
            value = ?decision.value,
            window = temporal.sequence_len,
            "Frame scored"
        );

        Ok(ScoredFrame {
            features,
            temporal,
            model,
            decision,
            frame_path,
        })
    }

    fn archive_crop(&self, session: SessionRef, crop: &DynamicImage) -> Option<String> {
        let archive = self.archive.as_ref()?;
        archive
            .store(session, crop)
            .map_err(|e| warn!(%session, "Frame capture failed: {e:#}"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use anyhow::bail;
    use candle_core::Device;
    use parking_lot::Mutex;

    use crate::domain::{EyeLandmarks, FaceLandmarks};
    use crate::inference::SequenceShape;
    use crate::pipeline::ScoreSource;
    use crate::ports::LandmarkDetector;

    enum Stub {
        Face,
        Empty,
        Broken,
    }

    impl LandmarkDetector for Stub {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn detect(&self, _image: &DynamicImage) -> Result<Option<FaceLandmarks>> {
            let eye = |cx: f32| EyeLandmarks {
                contour: [
                    [cx - 5.0, 30.0],
                    [cx - 2.0, 28.5],
                    [cx + 2.0, 28.5],
                    [cx + 5.0, 30.0],
                    [cx + 2.0, 31.5],
                    [cx - 2.0, 31.5],
                ],
                iris: [cx, 30.0],
            };
            match self {
                Self::Face => Ok(Some(FaceLandmarks {
                    left_eye: eye(40.0),
                    right_eye: eye(24.0),
                    face_points: vec![[32.0, 40.0], [32.0, 48.0]],
                    confidence: 0.9,
                })),
                Self::Empty => Ok(None),
                Self::Broken => bail!("weights missing"),
            }
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(SessionRef, u32)>>);

    impl FrameArchive for Recorder {
        fn store(&self, session: SessionRef, crop: &DynamicImage) -> Result<String> {
            self.0.lock().push((session, crop.width()));
            Ok(format!("{session}/0.jpg"))
        }
    }

    fn pipeline(stub: Stub) -> AttentionPipeline {
        let shape = SequenceShape::rgb(4, 16);
        AttentionPipeline::new(
            FeatureExtractor::new(Arc::new(stub)),
            Arc::new(SessionStore::new(shape.seq_len, Duration::from_secs(60))),
            Arc::new(ModelRuntime::new(None, shape, Device::Cpu)),
        )
    }

    #[test]
    fn test_no_face_appends_zero_feature_only() -> Result<()> {
        let p = pipeline(Stub::Empty);
        let key = SessionRef::Course(1);
        let scored = p.process(key, &DynamicImage::new_rgb8(64, 64), &EventContext::default())?;

        assert_eq!(scored.decision.source, ScoreSource::NoFace);
        assert!(scored.decision.value.is_none());
        assert_eq!(scored.model, ModelOutcome::Unavailable(Unavailable::NoFace));

        let snap = p.store().snapshot(key).unwrap_or_else(|| panic!("session created"));
        assert_eq!(snap.features.len(), 1);
        assert!(snap.features[0].score.abs() < f32::EPSILON);
        assert!(snap.frames.is_empty());
        Ok(())
    }

    #[test]
    fn test_face_frames_fill_windows_and_fall_back_to_heuristic() -> Result<()> {
        let p = pipeline(Stub::Face);
        let key = SessionRef::Diagnostic(5);
        let image = DynamicImage::new_rgb8(64, 64);

        let mut last = None;
        for _ in 0..6 {
            last = Some(p.process(key, &image, &EventContext::default())?);
        }
        let scored = last.unwrap_or_else(|| panic!("processed"));
        assert_eq!(scored.decision.source, ScoreSource::Heuristic);
        assert_eq!(scored.model, ModelOutcome::Unavailable(Unavailable::NotLoaded));
        assert_eq!(scored.temporal.sequence_len, 4);
        assert!(scored.decision.value.is_some_and(|v| (0.0..=1.0).contains(&v)));

        let snap = p.store().snapshot(key).unwrap_or_else(|| panic!("session created"));
        assert_eq!(snap.frames.len(), 4);
        assert_eq!(snap.frames[0].dims(), &[3, 16, 16]);
        Ok(())
    }

    #[test]
    fn test_detector_failure_propagates() {
        let p = pipeline(Stub::Broken);
        let result = p.process(SessionRef::Course(1), &DynamicImage::new_rgb8(8, 8), &EventContext::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_crops_are_archived() -> Result<()> {
        let recorder = Arc::new(Recorder::default());
        let p = pipeline(Stub::Face).with_archive(recorder.clone());
        let scored = p.process(SessionRef::Course(2), &DynamicImage::new_rgb8(64, 64), &EventContext::default())?;

        assert_eq!(scored.frame_path.as_deref(), Some("course-2/0.jpg"));
        assert_eq!(recorder.0.lock().as_slice(), &[(SessionRef::Course(2), 16)]);
        Ok(())
    }
}
