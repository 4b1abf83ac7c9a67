//! Byte-level transfer accounting: rate sampling, stream decoration, and
//! user-facing progress events.

mod progress;
mod statistics;
mod timed;
mod validation;

pub use progress::{ProgressCounter, ProgressEvent, ProgressSink, SharedProgressCounter};
pub use statistics::{StatisticsConsumer, StatisticsTracker, TransferStatistics};
pub use timed::{TimedReader, TimedWriter};
pub use validation::{require_absolute, validate_relative_path};

/// Sampling period of [`StatisticsTracker`].
pub const SAMPLE_PERIOD: std::time::Duration = std::time::Duration::from_secs(1);

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
}
