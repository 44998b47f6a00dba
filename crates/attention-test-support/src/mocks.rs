//! Mock implementations of core port traits.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use attention_core::domain::{AttentionEvent, DiagnosticResult, FaceLandmarks, RawEvent, WindowedSample};
use attention_core::ports::{
    Delivery, EventSink, ForwardError, FrameLoader, LandmarkDetector, ProgressEvent, ProgressSink,
    RecordSource, SampleOutput,
};
use image::DynamicImage;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock landmark detector.
///
/// Returns the same answer for every frame and counts calls.
pub struct MockLandmarkDetector {
    answer: Result<Option<FaceLandmarks>, String>,
    calls: Arc<Mutex<usize>>,
}

impl MockLandmarkDetector {
    /// Detects `landmarks` in every frame.
    #[must_use]
    pub fn always(landmarks: FaceLandmarks) -> Self {
        Self::with_answer(Ok(Some(landmarks)))
    }

    /// Never finds a face.
    #[must_use]
    pub fn no_face() -> Self {
        Self::with_answer(Ok(None))
    }

    /// Fails every call with `message`, like a detector without weights.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self::with_answer(Err(message.to_string()))
    }

    fn with_answer(answer: Result<Option<FaceLandmarks>, String>) -> Self {
        Self {
            answer,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Number of `detect` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

impl LandmarkDetector for MockLandmarkDetector {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn detect(&self, _image: &DynamicImage) -> anyhow::Result<Option<FaceLandmarks>> {
        *lock(&self.calls) += 1;
        self.answer.clone().map_err(|e| anyhow::anyhow!(e))
    }

    fn is_ready(&self) -> bool {
        self.answer.is_ok()
    }
}

/// How [`MockEventSink`] answers.
#[derive(Debug, Clone)]
pub enum SinkBehaviour {
    /// Accept every event.
    Accept,
    /// Behave like a forwarder without credentials.
    Disabled,
    /// Fail with this error.
    Fail(ForwardError),
}

/// Mock event sink capturing every event it is given.
pub struct MockEventSink {
    behaviour: SinkBehaviour,
    events: Arc<Mutex<Vec<AttentionEvent>>>,
}

impl MockEventSink {
    /// Sink answering per `behaviour`.
    #[must_use]
    pub fn new(behaviour: SinkBehaviour) -> Self {
        Self {
            behaviour,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sink accepting every event.
    #[must_use]
    pub fn accepting() -> Self {
        Self::new(SinkBehaviour::Accept)
    }

    /// Captured events, in order.
    #[must_use]
    pub fn events(&self) -> Vec<AttentionEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl EventSink for MockEventSink {
    async fn send(&self, event: &AttentionEvent) -> Result<Delivery, ForwardError> {
        lock(&self.events).push(event.clone());
        match &self.behaviour {
            SinkBehaviour::Accept => Ok(Delivery::Accepted),
            SinkBehaviour::Disabled => Ok(Delivery::Disabled),
            SinkBehaviour::Fail(e) => Err(e.clone()),
        }
    }
}

/// In-memory record source.
#[derive(Default)]
pub struct MockRecordSource {
    results: Vec<DiagnosticResult>,
    events: Vec<RawEvent>,
}

impl MockRecordSource {
    /// Source over the given records.
    #[must_use]
    pub fn new(results: Vec<DiagnosticResult>, events: Vec<RawEvent>) -> Self {
        Self { results, events }
    }
}

impl RecordSource for MockRecordSource {
    fn results(&self) -> anyhow::Result<Vec<DiagnosticResult>> {
        Ok(self.results.clone())
    }

    fn phase_events(&self, session_id: i64, phase: i64) -> anyhow::Result<Vec<RawEvent>> {
        let mut events: Vec<RawEvent> = self
            .events
            .iter()
            .filter(|e| e.session_id == session_id && e.phase() == Some(phase))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}

/// Mock sample output capturing samples for assertions.
#[derive(Default)]
pub struct MockSampleOutput {
    samples: Arc<Mutex<Vec<WindowedSample>>>,
    flush_count: Arc<Mutex<usize>>,
}

impl MockSampleOutput {
    /// Empty output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured samples.
    #[must_use]
    pub fn samples(&self) -> Vec<WindowedSample> {
        lock(&self.samples).clone()
    }

    /// Number of `flush()` calls.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        *lock(&self.flush_count)
    }
}

impl SampleOutput for MockSampleOutput {
    fn write(&self, sample: &WindowedSample) -> anyhow::Result<()> {
        lock(&self.samples).push(sample.clone());
        Ok(())
    }

    fn flush(&self) -> anyhow::Result<()> {
        *lock(&self.flush_count) += 1;
        Ok(())
    }
}

/// Frame loader over an in-memory set of frames.
///
/// References resolve only when registered; unregistered ones stay
/// unresolved, like a missing file.
#[derive(Default)]
pub struct MockFrameLoader {
    frames: HashMap<String, DynamicImage>,
    broken: HashSet<String>,
}

impl MockFrameLoader {
    /// Empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `image` under `reference`.
    #[must_use]
    pub fn with_frame(mut self, reference: &str, image: DynamicImage) -> Self {
        self.frames.insert(reference.to_string(), image);
        self
    }

    /// Registers `reference` as resolvable but undecodable.
    #[must_use]
    pub fn with_broken(mut self, reference: &str) -> Self {
        self.broken.insert(reference.to_string());
        self
    }
}

impl FrameLoader for MockFrameLoader {
    fn resolve(&self, reference: &str) -> Option<String> {
        (self.frames.contains_key(reference) || self.broken.contains(reference))
            .then(|| reference.to_string())
    }

    fn load(&self, path: &str) -> anyhow::Result<DynamicImage> {
        self.frames
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("cannot decode {path}"))
    }
}

/// Mock implementation of `ProgressSink` for testing.
///
/// Captures events for later assertions.
#[derive(Default)]
pub struct MockProgressSink {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl MockProgressSink {
    /// Creates a new mock progress sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all captured events.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }

    /// Returns the number of `Skipped` events.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Skipped { .. }))
            .count()
    }

    /// Returns the number of `Epoch` events.
    #[must_use]
    pub fn epoch_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Epoch { .. }))
            .count()
    }

    /// Returns whether a `Finished` event was received.
    #[must_use]
    pub fn has_finished(&self) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, ProgressEvent::Finished { .. }))
    }
}

impl ProgressSink for MockProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        lock(&self.events).push(event);
    }
}
