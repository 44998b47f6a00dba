//! Ports for offline dataset construction.

use image::DynamicImage;

use crate::domain::{DiagnosticResult, RawEvent, SessionRef, WindowedSample};

/// Source of persisted diagnostic results and their per-frame events.
pub trait RecordSource: Send + Sync {
    /// All completed diagnostic results.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn results(&self) -> anyhow::Result<Vec<DiagnosticResult>>;

    /// Events of `session_id` tagged with `phase`, in timestamp order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn phase_events(&self, session_id: i64, phase: i64) -> anyhow::Result<Vec<RawEvent>>;
}

/// Sink for windowed samples.
pub trait SampleOutput: Send + Sync {
    /// Writes one sample.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write(&self, sample: &WindowedSample) -> anyhow::Result<()>;

    /// Flushes buffered output.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    fn flush(&self) -> anyhow::Result<()>;
}

/// Loader for archived frame images referenced by frame-mode samples.
pub trait FrameLoader: Send + Sync {
    /// Resolves a stored reference to a readable location, or `None` when
    /// the frame is not available.
    fn resolve(&self, reference: &str) -> Option<String>;

    /// Loads a resolved frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be read or decoded.
    fn load(&self, path: &str) -> anyhow::Result<DynamicImage>;
}

/// Archive for face crops captured while serving, later consumed by the
/// frame-mode export.
pub trait FrameArchive: Send + Sync {
    /// Stores one crop of `session` and returns the reference to record in
    /// the event payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the crop cannot be encoded or written.
    fn store(&self, session: SessionRef, crop: &DynamicImage) -> anyhow::Result<String>;
}
