//! Test support utilities for attention-ml.
//!
//! Provides mock port implementations and synthetic fixtures (landmark sets,
//! frames, persisted records) shared by the tests of every crate.
//!
//! # Example
//!
//! ```
//! use attention_test_support::{MockLandmarkDetector, SyntheticLandmarks};
//!
//! // A detector that always sees an attentive face
//! let detector = MockLandmarkDetector::always(SyntheticLandmarks::attentive());
//! assert_eq!(detector.calls(), 0);
//! ```

mod builders;
mod mocks;

pub use builders::{RecordBuilder, SyntheticImageBuilder, SyntheticLandmarks};
pub use mocks::{
    MockEventSink, MockFrameLoader, MockLandmarkDetector, MockProgressSink, MockRecordSource,
    MockSampleOutput, SinkBehaviour,
};
