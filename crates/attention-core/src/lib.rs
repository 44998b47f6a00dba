//! Attention inference core.
//!
//! Domain types, the online scoring pipeline (feature extraction, session
//! windows, temporal aggregation, model arbitration), offline dataset
//! windowing, model training, candle networks, and the ports adapters
//! implement.

pub mod dataset;
pub mod domain;
pub mod inference;
pub mod pipeline;
pub mod ports;
pub mod training;

pub use domain::{AttentionEvent, EventContext, FrameFeatures, SessionRef, WindowedSample};
pub use inference::{ModelOutcome, ModelRuntime};
pub use pipeline::{AttentionPipeline, SessionStore};
pub use ports::{EventSink, LandmarkDetector, ProgressEvent, ProgressSink};
