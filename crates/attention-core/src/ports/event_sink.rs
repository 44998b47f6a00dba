//! Event sink port: where scored events are delivered.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::AttentionEvent;

/// Outcome of a delivery attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The backend accepted the event.
    Accepted,
    /// Forwarding is disabled (no credential configured); nothing was sent.
    Disabled,
}

impl Delivery {
    /// Whether the event actually left the process.
    #[must_use]
    pub const fn forwarded(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Delivery failures. There is no retry: one failure is one lost request.
#[derive(Debug, Clone, Error)]
pub enum ForwardError {
    /// The backend answered with a status of 400 or above.
    #[error("backend rejected event with status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },
    /// No answer within the configured timeout.
    #[error("backend did not answer within {seconds}s")]
    Timeout {
        /// Timeout that elapsed.
        seconds: u64,
    },
    /// Connection or protocol failure.
    #[error("backend unreachable: {0}")]
    Transport(String),
}

/// Port for delivering events to the record-keeping backend.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError`] when the backend cannot be reached or rejects
    /// the event.
    async fn send(&self, event: &AttentionEvent) -> Result<Delivery, ForwardError>;
}
