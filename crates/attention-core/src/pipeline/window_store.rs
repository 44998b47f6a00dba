//! Per-session rolling windows.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use candle_core::Tensor;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Serialize;
use tracing::debug;

use crate::domain::{FrameFeatures, SessionRef};

/// Default frames per window.
pub const DEFAULT_SEQUENCE_LENGTH: usize = 16;

/// FIFO buffer holding at most `capacity` items.
#[derive(Debug, Clone)]
pub struct BoundedWindow<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedWindow<T> {
    /// Empty window. A zero capacity is raised to 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item`, evicting the oldest entry when full.
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the window holds `capacity` items.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    /// Maximum length.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items oldest first.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> BoundedWindow<T> {
    /// Copy of the items, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

/// Scalar cues kept per frame in the feature window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureSample {
    /// Instantaneous heuristic score.
    pub score: f32,
    /// Eye openness.
    pub eye_openness: f32,
    /// Gaze centring.
    pub gaze_center: f32,
    /// Eye aspect ratio.
    pub eye_aspect_ratio: f32,
}

impl From<&FrameFeatures> for FeatureSample {
    fn from(f: &FrameFeatures) -> Self {
        Self {
            score: f.instant_score(),
            eye_openness: f.eye_openness,
            gaze_center: f.gaze_center,
            eye_aspect_ratio: f.eye_aspect_ratio,
        }
    }
}

/// Rolling windows of one session.
#[derive(Debug)]
pub struct SessionState {
    features: BoundedWindow<FeatureSample>,
    frames: BoundedWindow<Tensor>,
}

impl SessionState {
    /// Empty state with windows of length `seq_len`.
    #[must_use]
    pub fn new(seq_len: usize) -> Self {
        Self {
            features: BoundedWindow::new(seq_len),
            frames: BoundedWindow::new(seq_len),
        }
    }

    /// Appends the cues of one frame.
    pub fn append_feature(&mut self, sample: FeatureSample) {
        self.features.push(sample);
    }

    /// Appends one normalised `(C, H, W)` face crop.
    pub fn append_frame(&mut self, crop: Tensor) {
        self.frames.push(crop);
    }

    /// Feature window.
    #[must_use]
    pub const fn features(&self) -> &BoundedWindow<FeatureSample> {
        &self.features
    }

    /// Frame window.
    #[must_use]
    pub const fn frames(&self) -> &BoundedWindow<Tensor> {
        &self.frames
    }
}

/// Read-only copy of a session's windows.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Feature window, oldest first.
    pub features: Vec<FeatureSample>,
    /// Frame window, oldest first.
    pub frames: Vec<Tensor>,
}

/// Lock-guarded session state plus its last access time.
#[derive(Debug)]
pub struct SessionHandle {
    state: Mutex<SessionState>,
    last_seen: Mutex<Instant>,
}

impl SessionHandle {
    fn new(seq_len: usize) -> Self {
        Self {
            state: Mutex::new(SessionState::new(seq_len)),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Locks the session for exclusive processing and marks it active.
    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        *self.last_seen.lock() = Instant::now();
        self.state.lock()
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_seen.lock())
    }
}

/// Process-wide map from session to its rolling windows.
///
/// The map lock is held only for lookup, insert and eviction; each session
/// has its own mutex, so sessions never block one another while requests for
/// the same session are processed one at a time.
#[derive(Debug)]
pub struct SessionStore {
    seq_len: usize,
    ttl: Duration,
    sessions: RwLock<HashMap<SessionRef, Arc<SessionHandle>>>,
}

impl SessionStore {
    /// Store whose windows hold `seq_len` entries and whose sessions expire
    /// after `ttl` without frames.
    #[must_use]
    pub fn new(seq_len: usize, ttl: Duration) -> Self {
        Self {
            seq_len: seq_len.max(1),
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Window length.
    #[must_use]
    pub const fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Idle time after which a session is evicted.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The session's handle, created on first use.
    pub fn session(&self, key: SessionRef) -> Arc<SessionHandle> {
        if let Some(handle) = self.sessions.read().get(&key) {
            return Arc::clone(handle);
        }
        let mut sessions = self.sessions.write();
        Arc::clone(sessions.entry(key).or_insert_with(|| {
            debug!(session = %key, "Created session window");
            Arc::new(SessionHandle::new(self.seq_len))
        }))
    }

    /// Appends frame cues to the session's feature window.
    pub fn append_feature(&self, key: SessionRef, sample: FeatureSample) {
        self.session(key).lock().append_feature(sample);
    }

    /// Appends a face crop to the session's frame window.
    pub fn append_frame(&self, key: SessionRef, crop: Tensor) {
        self.session(key).lock().append_frame(crop);
    }

    /// Copy of the session's windows, or `None` for an unknown session.
    #[must_use]
    pub fn snapshot(&self, key: SessionRef) -> Option<SessionSnapshot> {
        let handle = self.sessions.read().get(&key).map(Arc::clone)?;
        let state = handle.state.lock();
        Some(SessionSnapshot {
            features: state.features.to_vec(),
            frames: state.frames.to_vec(),
        })
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Drops sessions idle for longer than the TTL as of `now`.
    /// Returns the number evicted.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, handle| handle.idle_for(now) <= self.ttl);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn sample(v: f32) -> FeatureSample {
        FeatureSample {
            score: v,
            eye_openness: v,
            gaze_center: v,
            eye_aspect_ratio: v,
        }
    }

    #[test]
    fn test_window_evicts_oldest_first() {
        let n = 16;
        let mut w = BoundedWindow::new(n);
        for v in 1..=n + 1 {
            w.push(v);
        }
        assert_eq!(w.len(), n);
        assert!(w.is_full());
        assert_eq!(w.to_vec(), (2..=n + 1).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_capacity_raised() {
        let mut w = BoundedWindow::new(0);
        w.push(1);
        w.push(2);
        assert_eq!(w.to_vec(), vec![2]);
        assert_eq!(w.capacity(), 1);
    }

    #[test]
    fn test_store_never_exceeds_seq_len() {
        let store = SessionStore::new(4, Duration::from_secs(60));
        let key = SessionRef::Course(1);
        for i in 0..10 {
            store.append_feature(key, sample(i as f32 / 10.0));
            let crop = Tensor::zeros((3, 2, 2), DType::F32, &Device::Cpu)
                .unwrap_or_else(|e| panic!("{e}"));
            store.append_frame(key, crop);
        }
        let snap = store.snapshot(key).unwrap_or_else(|| panic!("session exists"));
        assert_eq!(snap.features.len(), 4);
        assert_eq!(snap.frames.len(), 4);
        assert!((snap.features[0].score - 0.6).abs() < 1e-6);
        assert!((snap.features[3].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_course_and_diagnostic_ids_do_not_collide() {
        let store = SessionStore::new(4, Duration::from_secs(60));
        store.append_feature(SessionRef::Course(7), sample(0.1));
        store.append_feature(SessionRef::Diagnostic(7), sample(0.9));
        store.append_feature(SessionRef::Diagnostic(7), sample(0.8));

        assert_eq!(store.len(), 2);
        let course = store.snapshot(SessionRef::Course(7)).map(|s| s.features.len());
        let diag = store.snapshot(SessionRef::Diagnostic(7)).map(|s| s.features.len());
        assert_eq!(course, Some(1));
        assert_eq!(diag, Some(2));
        assert!(store.snapshot(SessionRef::Course(8)).is_none());
    }

    #[test]
    fn test_evict_idle_sessions() {
        let store = SessionStore::new(4, Duration::from_secs(10));
        store.append_feature(SessionRef::Course(1), sample(0.5));
        store.append_feature(SessionRef::Course(2), sample(0.5));

        assert_eq!(store.evict_idle(Instant::now()), 0);
        assert_eq!(store.evict_idle(Instant::now() + Duration::from_secs(11)), 2);
        assert!(store.is_empty());
    }
}
