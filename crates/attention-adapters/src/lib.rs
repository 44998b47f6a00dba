//! Attention adapters - external adapters for attention-ml.
//!
//! This crate provides adapters for:
//! - Persisted backend records and JSON Lines datasets
//! - The face-crop archive and frame loading
//! - Forwarding events to the backend over HTTP
//! - Detector weights lookup

pub mod fs;
pub mod http;
pub mod models;

pub use fs::{read_samples, FsFrameArchive, FsFrameLoader, FsRecordSource, JsonlSampleOutput, RecordDump};
pub use http::{HttpEventForwarder, DEFAULT_TIMEOUT};
pub use models::{model_path, models_dir};
