//! Online pipeline integration tests with a mock landmark detector.

#![allow(clippy::unwrap_used, clippy::float_cmp)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use attention_core::domain::{EventContext, SessionRef, LABEL_MODEL, LABEL_NO_FACE, LABEL_SEQUENCE};
use attention_core::inference::{
    export_artifact, AttentionSequenceModel, ModelOutcome, ModelRuntime, SequenceShape, Unavailable,
};
use attention_core::pipeline::{AttentionPipeline, FeatureExtractor, ScoreSource, SessionStore};
use attention_test_support::{MockLandmarkDetector, SyntheticImageBuilder, SyntheticLandmarks};
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};

fn pipeline(detector: MockLandmarkDetector, runtime: ModelRuntime, seq_len: usize) -> AttentionPipeline {
    AttentionPipeline::new(
        FeatureExtractor::new(Arc::new(detector)),
        Arc::new(SessionStore::new(seq_len, Duration::from_secs(60))),
        Arc::new(runtime),
    )
}

fn heuristic_only(seq_len: usize) -> ModelRuntime {
    ModelRuntime::new(None, SequenceShape::rgb(seq_len, 16), Device::Cpu)
}

fn export(base: &Path, shape: SequenceShape) {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    AttentionSequenceModel::new(shape, &vb).unwrap();
    export_artifact(&varmap, shape, base).unwrap();
}

#[test]
fn test_attentive_face_scores_high_by_heuristic() {
    let p = pipeline(
        MockLandmarkDetector::always(SyntheticLandmarks::attentive()),
        heuristic_only(4),
        4,
    );
    let session = SessionRef::Course(1);
    let ctx = EventContext::default();

    for expected_len in 1..=6 {
        let scored = p.process(session, &SyntheticImageBuilder::frame(), &ctx).unwrap();
        assert_eq!(scored.temporal.sequence_len, expected_len.min(4));
        assert_eq!(scored.decision.source, ScoreSource::Heuristic);
        assert!((scored.decision.value.unwrap() - 1.0).abs() < 1e-5);
        assert_eq!(scored.model, ModelOutcome::Unavailable(Unavailable::NotLoaded));
    }

    let event = p
        .process(session, &SyntheticImageBuilder::frame(), &ctx)
        .unwrap()
        .to_event(session, 7, &ctx);
    assert_eq!(event.label, LABEL_SEQUENCE);
    assert_eq!(event.data["frame"]["face"], true);
    assert_eq!(event.data["temporal"]["sequence_len"], 4);
    assert_eq!(event.data["model"]["unavailable"]["reason"], "not_loaded");
}

#[test]
fn test_closed_eyes_lower_the_score() {
    let p = pipeline(
        MockLandmarkDetector::always(SyntheticLandmarks::eyes_closed()),
        heuristic_only(4),
        4,
    );
    let scored = p
        .process(SessionRef::Course(1), &SyntheticImageBuilder::frame(), &EventContext::default())
        .unwrap();
    // 0.6 * 0.5 + 0.2 * 0 + 0.2 * 1
    assert!((scored.decision.value.unwrap() - 0.5).abs() < 1e-4);
}

#[test]
fn test_no_face_emits_sentinel() {
    let p = pipeline(MockLandmarkDetector::no_face(), heuristic_only(4), 4);
    let session = SessionRef::Diagnostic(3);
    let ctx = EventContext::default();

    let scored = p.process(session, &SyntheticImageBuilder::frame(), &ctx).unwrap();
    assert_eq!(scored.decision.source, ScoreSource::NoFace);
    assert_eq!(scored.decision.value, None);
    assert_eq!(scored.model, ModelOutcome::Unavailable(Unavailable::NoFace));
    // The no-face frame still enters the feature window.
    assert_eq!(scored.temporal.sequence_len, 1);

    let event = scored.to_event(session, 1, &ctx);
    assert_eq!(event.label, LABEL_NO_FACE);
    assert!(event.value.is_none());
}

#[test]
fn test_detector_failure_is_an_error() {
    let p = pipeline(MockLandmarkDetector::failing("weights missing"), heuristic_only(4), 4);
    let err = p
        .process(SessionRef::Course(1), &SyntheticImageBuilder::frame(), &EventContext::default())
        .unwrap_err();
    assert!(format!("{err:#}").contains("weights missing"));
    assert!(!p.detector_ready());
}

#[test]
fn test_sessions_are_isolated() {
    let p = pipeline(
        MockLandmarkDetector::always(SyntheticLandmarks::attentive()),
        heuristic_only(4),
        4,
    );
    let ctx = EventContext::default();
    for _ in 0..3 {
        p.process(SessionRef::Course(5), &SyntheticImageBuilder::frame(), &ctx).unwrap();
    }
    let other = p
        .process(SessionRef::Diagnostic(5), &SyntheticImageBuilder::frame(), &ctx)
        .unwrap();
    assert_eq!(other.temporal.sequence_len, 1);
    assert_eq!(p.store().len(), 2);
}

#[test]
fn test_concurrent_frames_of_one_session_are_serialised() {
    const FRAMES: usize = 10;
    const SEQ_LEN: usize = 4;
    let p = pipeline(
        MockLandmarkDetector::always(SyntheticLandmarks::attentive()),
        heuristic_only(SEQ_LEN),
        SEQ_LEN,
    );
    let ctx = EventContext::default();
    let image = SyntheticImageBuilder::frame();
    let busy = SessionRef::Course(1);
    let quiet = SessionRef::Diagnostic(1);
    p.process(quiet, &image, &ctx).unwrap();

    let mut lengths: Vec<usize> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..FRAMES)
            .map(|_| s.spawn(|| p.process(busy, &image, &ctx).unwrap().temporal.sequence_len))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Each frame saw the window one longer than the frame before it.
    lengths.sort_unstable();
    let expected: Vec<usize> = (1..=FRAMES).map(|i| i.min(SEQ_LEN)).collect();
    assert_eq!(lengths, expected);

    let busy_window = p.store().snapshot(busy).unwrap();
    assert_eq!(busy_window.features.len(), SEQ_LEN);
    assert_eq!(busy_window.frames.len(), SEQ_LEN);

    let quiet_window = p.store().snapshot(quiet).unwrap();
    assert_eq!(quiet_window.features.len(), 1);
    assert_eq!(quiet_window.frames.len(), 1);
}

#[test]
fn test_loaded_model_takes_over_once_window_fills() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("attention");
    let shape = SequenceShape::rgb(2, 16);
    export(&base, shape);

    let runtime = ModelRuntime::new(Some(base), shape, Device::Cpu);
    assert!(runtime.is_loaded());
    let p = pipeline(MockLandmarkDetector::always(SyntheticLandmarks::attentive()), runtime, 2);
    let session = SessionRef::Course(1);
    let ctx = EventContext::default();

    let first = p.process(session, &SyntheticImageBuilder::frame(), &ctx).unwrap();
    assert_eq!(
        first.model,
        ModelOutcome::Unavailable(Unavailable::WindowNotFull { len: 1, required: 2 })
    );
    assert_eq!(first.decision.source, ScoreSource::Heuristic);

    let second = p.process(session, &SyntheticImageBuilder::frame(), &ctx).unwrap();
    assert_eq!(second.decision.source, ScoreSource::Model);
    assert_eq!(second.to_event(session, 1, &ctx).label, LABEL_MODEL);

    let spinning = EventContext {
        spinning: true,
        ..EventContext::default()
    };
    let third = p.process(session, &SyntheticImageBuilder::frame(), &spinning).unwrap();
    assert_eq!(third.model, ModelOutcome::Unavailable(Unavailable::Distractor));
    assert_eq!(third.decision.source, ScoreSource::Heuristic);
}
