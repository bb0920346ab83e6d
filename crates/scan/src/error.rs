//! Scan Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Store-level causes are preserved as
//! children in the error tree via `raise`.

use derive_more::{Display, Error};

/// A scan error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A segment worker gave up after its bounded run of consecutive
    /// non-throttling failures. Throttling never produces this.
    #[display("segment {segment} failed after {attempts} consecutive attempts")]
    SegmentFailed { segment: usize, attempts: u32 },
    /// A segment worker panicked, almost always from a panicking handler.
    #[display("worker for segment {segment} panicked")]
    WorkerPanicked { segment: usize },
    /// Reading a segment's checkpoint failed after bounded retries.
    #[display("could not read checkpoint for segment {segment}")]
    CheckpointGet { segment: usize },
    /// Writing a segment's checkpoint failed after bounded retries.
    #[display("could not write checkpoint for segment {segment}")]
    CheckpointPut { segment: usize },
}
