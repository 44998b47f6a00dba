//! Progress reporting port for long-running offline jobs.

/// Events emitted by dataset export and training.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A job stage started.
    Started {
        /// Stage name.
        stage: String,
        /// Units of work, if known.
        total: Option<usize>,
    },
    /// One unit of work completed.
    Advanced {
        /// Short description of the completed unit.
        message: String,
    },
    /// A unit of work was skipped.
    Skipped {
        /// What was skipped.
        item: String,
        /// Why.
        reason: String,
    },
    /// A training epoch finished.
    Epoch {
        /// 1-based epoch number.
        epoch: usize,
        /// Mean training loss.
        train_loss: f32,
        /// Validation loss, if a validation split exists.
        val_loss: Option<f32>,
        /// Validation MAE, if a validation split exists.
        val_mae: Option<f32>,
    },
    /// The job finished.
    Finished {
        /// Final summary line.
        summary: String,
    },
}

/// Port for receiving progress events.
pub trait ProgressSink: Send + Sync {
    /// Called when a progress event occurs.
    fn on_event(&self, event: ProgressEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_event(&self, _event: ProgressEvent) {}
}
