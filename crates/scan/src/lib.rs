//! Segmented parallel table scans with resumable checkpoints.
//!
//! [`Scanner`] fans a full-table scan out across N disjoint segments,
//! each driven by its own worker task. Every page of records is handed
//! to a [`ScanHandler`]; progress per segment is optionally persisted
//! through [`checkpoint::Checkpoint`] so an interrupted run resumes
//! where it left off.

pub mod backoff;
pub mod checkpoint;
pub mod error;
mod handler;
mod metrics;
mod scanner;
mod worker;

pub use crate::handler::ScanHandler;
pub use crate::metrics::{MetricsSnapshot, ScanMetrics};
pub use crate::scanner::{ScanReport, ScanRun, Scanner, SegmentFailure};
