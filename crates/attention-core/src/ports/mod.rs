//! Port definitions for hexagonal architecture.
//!
//! These traits define the boundaries between the domain core and external adapters.

mod event_sink;
mod landmarks;
mod progress;
mod records;

pub use event_sink::{Delivery, EventSink, ForwardError};
pub use landmarks::LandmarkDetector;
pub use progress::{NoProgress, ProgressEvent, ProgressSink};
pub use records::{FrameArchive, FrameLoader, RecordSource, SampleOutput};
