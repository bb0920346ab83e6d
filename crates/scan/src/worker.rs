//! The per-segment worker state machine.
//!
//! `Init → Scanning ⇄ Throttled → Completed`, with `Cancelled` as a second
//! terminal outcome. A worker's cursor is strictly local state: segments
//! partition the key space disjointly by construction of the store's scan
//! primitive, so each worker is a pure, independent retry loop.

use crate::backoff::Backoff;
use crate::checkpoint::Checkpoint;
use crate::error::{ErrorKind, Result};
use crate::handler::ScanHandler;
use crate::metrics::ScanMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use trawl_store::{ScanRequest, StoreHandle};

/// Consecutive non-throttling failures tolerated before a segment is
/// surfaced as failed. Throttling never counts toward this: capacity
/// errors retry indefinitely.
pub(crate) const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Terminal state of one segment worker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Outcome {
    /// The segment was scanned to exhaustion.
    Completed,
    /// Cancellation was requested before the segment finished.
    Cancelled,
}

/// Drives one segment's scan to completion. Receives exactly the
/// dependencies it needs; nothing is inherited from a shared config.
pub(crate) struct SegmentWorker {
    pub store: StoreHandle,
    pub table: String,
    pub segment: usize,
    pub total_segments: usize,
    pub consistent: bool,
    pub checkpoint: Option<Arc<Checkpoint>>,
    pub metrics: Arc<ScanMetrics>,
    pub cancel: CancellationToken,
}

impl SegmentWorker {
    pub(crate) async fn run(self, handler: Arc<dyn ScanHandler>) -> Result<Outcome> {
        // Init: resume from the checkpointed cursor when there is one. A
        // failed read only costs rework, so it degrades to a from-scratch
        // scan instead of failing the segment.
        let mut cursor = match &self.checkpoint {
            Some(checkpoint) => match checkpoint.get(self.segment).await {
                Ok(cursor) => cursor,
                Err(err) => {
                    warn!(
                        segment = self.segment,
                        error = %err,
                        "checkpoint read failed; scanning segment from the start"
                    );
                    None
                },
            },
            None => None,
        };
        if cursor.is_some() {
            debug!(segment = self.segment, "resuming from checkpointed cursor");
        }

        let mut backoff = Backoff::default();
        let mut failures = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }
            let request = ScanRequest {
                table: self.table.clone(),
                segment: self.segment,
                total_segments: self.total_segments,
                start_cursor: cursor.clone(),
                consistent: self.consistent,
            };
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(Outcome::Cancelled),
                result = self.store.scan(&request) => result,
            };
            match result {
                Ok(page) => {
                    backoff.reset();
                    failures = 0;
                    self.metrics.record_page(page.records.len());
                    // Fire-and-forget with respect to the handler: its
                    // failures are invisible to this state machine.
                    handler.handle(page.records);
                    match page.next_cursor {
                        Some(next) => {
                            if let Some(checkpoint) = &self.checkpoint {
                                if let Err(err) = checkpoint.put(self.segment, &next).await {
                                    // In-memory progress continues; a
                                    // future resume redoes this page at
                                    // worst, never skips it.
                                    warn!(segment = self.segment, error = %err, "checkpoint write failed");
                                }
                            }
                            cursor = Some(next);
                        },
                        None => {
                            self.metrics.record_completed_segment();
                            debug!(segment = self.segment, "segment exhausted");
                            return Ok(Outcome::Completed);
                        },
                    }
                },
                Err(err) if err.is_throttled() => {
                    debug!(segment = self.segment, "throttled; backing off");
                    if !self.sleep(backoff.next_delay()).await {
                        return Ok(Outcome::Cancelled);
                    }
                },
                Err(err) if err.is_retryable() => {
                    failures += 1;
                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        return Err(err.raise(ErrorKind::SegmentFailed {
                            segment: self.segment,
                            attempts: failures,
                        }));
                    }
                    warn!(segment = self.segment, failures, error = %err, "scan failed; backing off");
                    if !self.sleep(backoff.next_delay()).await {
                        return Ok(Outcome::Cancelled);
                    }
                },
                Err(err) => {
                    return Err(err.raise(ErrorKind::SegmentFailed {
                        segment: self.segment,
                        attempts: failures + 1,
                    }));
                },
            }
        }
    }

    /// Backoff sleep that loses the race against cancellation. Returns
    /// `false` if cancelled while sleeping.
    async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
