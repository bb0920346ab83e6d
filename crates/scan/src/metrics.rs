//! Run-scoped progress counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Progress counters for one scan run, shared by all of its workers.
///
/// Owned by the orchestrator and readable at any time while the run is in
/// flight; pure data, no lifecycle beyond the run itself. Counters only
/// ever increase: once per handled page for items and pages, once per
/// segment completion for segments. Plain relaxed atomics; nothing
/// synchronizes *through* these values.
#[derive(Debug, Default)]
pub struct ScanMetrics {
    items_processed: AtomicU64,
    pages_scanned: AtomicU64,
    completed_segments: AtomicU64,
}

impl ScanMetrics {
    pub(crate) fn record_page(&self, batch_size: usize) {
        self.pages_scanned.fetch_add(1, Ordering::Relaxed);
        // Infallible: a usize (either 32- or 64-bit) always fits in a u64.
        self.items_processed.fetch_add(batch_size as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_completed_segment(&self) {
        self.completed_segments.fetch_add(1, Ordering::Relaxed);
    }

    /// Total records delivered to the handler across all segments.
    pub fn items_processed(&self) -> u64 {
        self.items_processed.load(Ordering::Relaxed)
    }

    /// Total pages handled across all segments.
    pub fn pages_scanned(&self) -> u64 {
        self.pages_scanned.load(Ordering::Relaxed)
    }

    /// Segments scanned to exhaustion so far.
    pub fn completed_segments(&self) -> u64 {
        self.completed_segments.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_processed: self.items_processed(),
            pages_scanned: self.pages_scanned(),
            completed_segments: self.completed_segments(),
        }
    }
}

/// A point-in-time copy of [`ScanMetrics`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MetricsSnapshot {
    pub items_processed: u64,
    pub pages_scanned: u64,
    pub completed_segments: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = ScanMetrics::default();
        metrics.record_page(5);
        metrics.record_page(0);
        metrics.record_completed_segment();
        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot { items_processed: 5, pages_scanned: 2, completed_segments: 1 }
        );
    }
}
