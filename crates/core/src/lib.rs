//! Core error taxonomy, compression policy, and progress protocol
//! for PPTX recompression.

pub mod error;
pub mod options;
pub mod progress;
pub mod summary;

pub use error::{Error, Result};
pub use options::{BatchConfig, CompressionOptions, TranscodePolicy};
pub use progress::{CollectingSink, NullSink, Phase, ProgressEvent, ProgressReporter, ProgressSink};
pub use summary::RunSummary;
