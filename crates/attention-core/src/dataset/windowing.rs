//! Fixed-stride windowing of persisted events into training samples.

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{debug, info};

use super::phase_label;
use crate::domain::{DiagnosticResult, ExportMode, PhaseRecord, RawEvent, SamplePayload, WindowedSample};
use crate::ports::{FrameLoader, ProgressEvent, ProgressSink, RecordSource, SampleOutput};

/// Default window stride.
pub const DEFAULT_STRIDE: usize = 4;

/// Values per feature-mode vector.
pub const FEATURE_COUNT: usize = 10;

/// Start indices `0, S, 2S, …` of every full window over `len` items.
pub fn window_starts(len: usize, seq_len: usize, stride: usize) -> impl Iterator<Item = usize> {
    let last = if seq_len == 0 || len < seq_len {
        None
    } else {
        Some(len - seq_len)
    };
    (0..=last.unwrap_or(0))
        .step_by(stride.max(1))
        .take_while(move |_| last.is_some())
}

/// Number of windows: `max(0, ⌊(len − N) / S⌋ + 1)`.
#[must_use]
pub fn window_count(len: usize, seq_len: usize, stride: usize) -> usize {
    window_starts(len, seq_len, stride).count()
}

/// One window cut from a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Window<P> {
    /// Index of the first item.
    pub start: usize,
    /// Payloads in order.
    pub items: Vec<P>,
}

/// Cuts full windows out of per-item payloads. Windows containing an
/// unresolved (`None`) payload are dropped and counted.
///
/// Shared by both export modes, which differ only in how payloads are
/// extracted.
pub fn slide_windows<P: Clone>(payloads: &[Option<P>], seq_len: usize, stride: usize) -> (Vec<Window<P>>, usize) {
    let mut windows = Vec::new();
    let mut dropped = 0;
    for start in window_starts(payloads.len(), seq_len, stride) {
        match payloads[start..start + seq_len].iter().cloned().collect::<Option<Vec<P>>>() {
            Some(items) => windows.push(Window { start, items }),
            None => dropped += 1,
        }
    }
    (windows, dropped)
}

/// Feature-mode vector of one event:
/// `ear, eyes_open, gaze_center, gaze_deviation, ‖gaze_offset‖, face,
/// temporal_mean, eyes_mean, gaze_mean, frame_score`.
#[must_use]
pub fn feature_vector(event: &RawEvent) -> Vec<f32> {
    vec![
        event.number("frame", "ear"),
        event.number("frame", "eyes_open"),
        event.number("frame", "gaze_center"),
        event.number("frame", "gaze_deviation"),
        event.number("frame", "gaze_offset"),
        f32::from(u8::from(event.face())),
        event.number("temporal", "temporal_mean"),
        event.number("temporal", "eyes_mean"),
        event.number("temporal", "gaze_mean"),
        event.number("temporal", "frame_score"),
    ]
}

/// Windowing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowerConfig {
    /// Frames per window (N).
    pub seq_len: usize,
    /// Offset between window starts (S).
    pub stride: usize,
    /// Payload kind.
    pub mode: ExportMode,
}

impl Default for WindowerConfig {
    fn default() -> Self {
        Self {
            seq_len: crate::pipeline::DEFAULT_SEQUENCE_LENGTH,
            stride: DEFAULT_STRIDE,
            mode: ExportMode::Features,
        }
    }
}

/// Counters of one export run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    /// Diagnostic results read.
    pub results: usize,
    /// Phases examined.
    pub phases: usize,
    /// Phases with fewer than N events.
    pub phases_skipped: usize,
    /// Windows dropped for an unresolved frame.
    pub windows_dropped: usize,
    /// Samples written.
    pub samples_written: usize,
    /// Distinct phase numbers among written samples.
    pub distinct_phases: usize,
}

/// Replays persisted events into labelled windows.
pub struct DatasetWindower<'a> {
    source: &'a dyn RecordSource,
    frames: Option<&'a dyn FrameLoader>,
    config: WindowerConfig,
}

impl<'a> DatasetWindower<'a> {
    /// Windower over `source`.
    #[must_use]
    pub fn new(source: &'a dyn RecordSource, config: WindowerConfig) -> Self {
        Self {
            source,
            frames: None,
            config,
        }
    }

    /// Frame resolver, required for [`ExportMode::Frames`].
    #[must_use]
    pub fn with_frames(mut self, frames: &'a dyn FrameLoader) -> Self {
        self.frames = Some(frames);
        self
    }

    /// Writes every sample to `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the source cannot be
    /// read, or the output fails.
    pub fn export(&self, output: &dyn SampleOutput, progress: &dyn ProgressSink) -> Result<ExportStats> {
        if self.config.seq_len == 0 || self.config.stride == 0 {
            bail!("sequence length and stride must be positive");
        }
        if self.config.mode == ExportMode::Frames && self.frames.is_none() {
            bail!("frame export needs a frame loader");
        }

        let results = self.source.results()?;
        progress.on_event(ProgressEvent::Started {
            stage: "export".to_string(),
            total: Some(results.len()),
        });

        let mut stats = ExportStats {
            results: results.len(),
            ..ExportStats::default()
        };
        let mut phases_seen = BTreeSet::new();

        for result in &results {
            for phase in &result.phase_data.phases {
                stats.phases += 1;
                let Some((samples, dropped)) = self.phase_samples(result, phase)? else {
                    stats.phases_skipped += 1;
                    progress.on_event(ProgressEvent::Skipped {
                        item: format!("session {} phase {}", result.session_id, phase.phase),
                        reason: format!("fewer than {} events", self.config.seq_len),
                    });
                    continue;
                };
                stats.windows_dropped += dropped;
                for sample in &samples {
                    output.write(sample)?;
                    phases_seen.insert(sample.phase);
                }
                stats.samples_written += samples.len();
            }
            progress.on_event(ProgressEvent::Advanced {
                message: format!("session {}", result.session_id),
            });
        }
        output.flush()?;

        stats.distinct_phases = phases_seen.len();
        info!(
            results = stats.results,
            samples = stats.samples_written,
            skipped = stats.phases_skipped,
            dropped = stats.windows_dropped,
            "Dataset export finished"
        );
        progress.on_event(ProgressEvent::Finished {
            summary: format!(
                "{} samples from {} results ({} distinct phases)",
                stats.samples_written, stats.results, stats.distinct_phases
            ),
        });
        Ok(stats)
    }

    /// Samples of one phase and the number of dropped windows, or `None`
    /// when the phase has fewer than N events.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read.
    pub fn phase_samples(
        &self,
        result: &DiagnosticResult,
        phase: &PhaseRecord,
    ) -> Result<Option<(Vec<WindowedSample>, usize)>> {
        let events = self.source.phase_events(result.session_id, phase.phase)?;
        let n = self.config.seq_len;
        if events.len() < n {
            debug!(
                session = result.session_id,
                phase = phase.phase,
                events = events.len(),
                "Too few events for a window"
            );
            return Ok(None);
        }

        let y = phase_label(&phase.summary, phase.duration_secs());
        let sample = |start: usize, payload| WindowedSample {
            session_id: result.session_id,
            user_id: result.user_id,
            phase: phase.phase,
            y,
            payload,
            mask: events[start..start + n]
                .iter()
                .map(|e| u8::from(!e.spinning()))
                .collect(),
        };

        let (samples, dropped) = match (self.config.mode, self.frames) {
            (ExportMode::Frames, Some(frames)) => {
                let paths: Vec<Option<String>> = events
                    .iter()
                    .map(|e| e.frame_path().and_then(|p| frames.resolve(p)))
                    .collect();
                let (windows, dropped) = slide_windows(&paths, n, self.config.stride);
                let samples = windows
                    .into_iter()
                    .map(|w| sample(w.start, SamplePayload::Frames { frames_paths: w.items }))
                    .collect();
                (samples, dropped)
            }
            (ExportMode::Frames, None) => bail!("frame export needs a frame loader"),
            (ExportMode::Features, _) => {
                let vectors: Vec<Option<Vec<f32>>> =
                    events.iter().map(|e| Some(feature_vector(e))).collect();
                let (windows, dropped) = slide_windows(&vectors, n, self.config.stride);
                let samples = windows
                    .into_iter()
                    .map(|w| sample(w.start, SamplePayload::Features { x: w.items }))
                    .collect();
                (samples, dropped)
            }
        };
        Ok(Some((samples, dropped)))
    }
}
