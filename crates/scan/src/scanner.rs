//! The scan orchestrator: fan out one worker per segment, join on all.

use crate::checkpoint::Checkpoint;
use crate::error::{Error, ErrorKind, Result};
use crate::handler::ScanHandler;
use crate::metrics::{MetricsSnapshot, ScanMetrics};
use crate::worker::{Outcome, SegmentWorker};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use trawl_store::StoreHandle;

/// Orchestrates one full-table scan split into a fixed number of
/// independently scanned segments.
///
/// Built by explicit dependency injection: the store handle, table name,
/// and segment count are required; consistency, checkpointing, and an
/// external cancellation token are opt-in. [`start`](Self::start) consumes
/// the scanner, so a run can only ever be started once.
///
/// The segment count is fixed for the lifetime of a run and must equal
/// the count used when any checkpoints for the same namespace were
/// written; segment key ranges are a function of it.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use trawl_scan::Scanner;
/// use trawl_store::{Record, ScanPage, StoreHandle, backend::MockStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MockStore::new();
/// store.script_segment(0, [Ok(ScanPage::new(vec![Record::new()], None))]);
/// store.script_segment(1, [Ok(ScanPage::new(vec![], None))]);
/// let store: StoreHandle = Arc::new(store);
///
/// let run = Scanner::new(store, "items", 2).start(Arc::new(|records: Vec<Record>| {
///     // Called once per page, concurrently from both segments.
///     let _ = records;
/// }));
/// let report = run.wait().await;
/// assert!(report.is_complete());
/// assert_eq!(report.metrics.completed_segments, 2);
/// # }
/// ```
pub struct Scanner {
    store: StoreHandle,
    table: String,
    total_segments: usize,
    consistent: bool,
    checkpoint: Option<Arc<Checkpoint>>,
    cancel: CancellationToken,
    metrics: Arc<ScanMetrics>,
}

impl Scanner {
    /// A scanner over `table` split into `total_segments` segments.
    /// `total_segments` must be at least 1; the configuration layer
    /// enforces this before a scanner is ever built.
    pub fn new(store: StoreHandle, table: impl Into<String>, total_segments: usize) -> Self {
        Self {
            store,
            table: table.into(),
            total_segments,
            consistent: false,
            checkpoint: None,
            cancel: CancellationToken::new(),
            metrics: Arc::new(ScanMetrics::default()),
        }
    }

    /// Request strongly-consistent reads for the scan itself. Checkpoint
    /// reads are always consistent regardless of this flag.
    pub fn with_consistent_reads(mut self, consistent: bool) -> Self {
        self.consistent = consistent;
        self
    }

    /// Enable durable progress checkpoints in `table`, scoped to
    /// `namespace`. Each worker resumes from its checkpointed cursor and
    /// overwrites it after every page.
    pub fn with_checkpoint(mut self, table: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.checkpoint = Some(Arc::new(Checkpoint::new(self.store.clone(), table, namespace)));
        self
    }

    /// Observe an externally owned cancellation token. Workers check it at
    /// the top of every loop iteration and race it against in-flight scan
    /// calls and backoff sleeps, so shutdown never waits on the store.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The run's progress counters, readable at any time.
    pub fn metrics(&self) -> Arc<ScanMetrics> {
        self.metrics.clone()
    }

    /// Spawn one concurrent worker task per segment, each bound to
    /// `handler`, and hand back the running scan. Begins `total_segments`
    /// independent conversations with the store immediately.
    pub fn start(self, handler: Arc<dyn ScanHandler>) -> ScanRun {
        info!(
            table = %self.table,
            segments = self.total_segments,
            store = self.store.name(),
            checkpointing = self.checkpoint.is_some(),
            "starting segmented scan"
        );
        let mut workers = Vec::with_capacity(self.total_segments);
        for segment in 0..self.total_segments {
            let worker = SegmentWorker {
                store: self.store.clone(),
                table: self.table.clone(),
                segment,
                total_segments: self.total_segments,
                consistent: self.consistent,
                checkpoint: self.checkpoint.clone(),
                metrics: self.metrics.clone(),
                cancel: self.cancel.clone(),
            };
            workers.push((segment, tokio::spawn(worker.run(handler.clone()))));
        }
        ScanRun { workers, metrics: self.metrics, cancel: self.cancel }
    }
}

/// A scan in flight. Produced by [`Scanner::start`].
pub struct ScanRun {
    workers: Vec<(usize, JoinHandle<Result<Outcome>>)>,
    metrics: Arc<ScanMetrics>,
    cancel: CancellationToken,
}

impl ScanRun {
    /// The run's progress counters, readable while workers are running.
    pub fn metrics(&self) -> Arc<ScanMetrics> {
        self.metrics.clone()
    }

    /// Request cancellation. Workers stop at their next loop iteration or
    /// mid-sleep; [`wait`](Self::wait) still joins them all.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The token workers observe, for wiring into external shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Block until every segment worker reaches a terminal state, then
    /// report what happened. Completion of the returned future is the
    /// run's only completion signal; per-segment fatal failures are
    /// reported here rather than silently swallowed.
    pub async fn wait(self) -> ScanReport {
        let mut report = ScanReport::default();
        for (segment, handle) in self.workers {
            match handle.await {
                Ok(Ok(Outcome::Completed)) => report.completed_segments += 1,
                Ok(Ok(Outcome::Cancelled)) => report.cancelled_segments += 1,
                Ok(Err(error)) => {
                    warn!(segment, error = %error, "segment failed");
                    report.failures.push(SegmentFailure { segment, error });
                },
                Err(join_error) => {
                    warn!(segment, error = %join_error, "segment worker panicked");
                    report.failures.push(SegmentFailure {
                        segment,
                        error: exn::Exn::from(ErrorKind::WorkerPanicked { segment }),
                    });
                },
            }
        }
        report.metrics = self.metrics.snapshot();
        info!(
            completed = report.completed_segments,
            cancelled = report.cancelled_segments,
            failed = report.failures.len(),
            items = report.metrics.items_processed,
            "scan finished"
        );
        report
    }
}

/// Aggregate result of one scan run.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Segments scanned to exhaustion.
    pub completed_segments: u64,
    /// Segments stopped by cancellation before exhaustion.
    pub cancelled_segments: u64,
    /// Segments that failed fatally, with their errors.
    pub failures: Vec<SegmentFailure>,
    /// Final counter values for the run.
    pub metrics: MetricsSnapshot,
}

impl ScanReport {
    /// `true` when every segment was scanned to exhaustion.
    pub fn is_complete(&self) -> bool {
        self.cancelled_segments == 0 && self.failures.is_empty()
    }
}

/// One fatally failed segment.
#[derive(Debug)]
pub struct SegmentFailure {
    pub segment: usize,
    pub error: Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::MAX_CONSECUTIVE_FAILURES;
    use std::sync::atomic::{AtomicU64, Ordering};
    use trawl_store::backend::MockStore;
    use trawl_store::error::ErrorKind as StoreErrorKind;
    use trawl_store::{AttributeValue, Cursor, Record};

    fn records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|index| Record::new().with("pk", AttributeValue::N(index.to_string())))
            .collect()
    }

    fn counting_handler(calls: Arc<AtomicU64>, items: Arc<AtomicU64>) -> Arc<dyn ScanHandler> {
        Arc::new(move |batch: Vec<Record>| {
            calls.fetch_add(1, Ordering::Relaxed);
            items.fetch_add(batch.len() as u64, Ordering::Relaxed);
        })
    }

    #[tokio::test]
    async fn test_handler_called_once_per_page_across_all_segments() {
        // 4 segments x 3 pages of 2 records each.
        let store = Arc::new(MockStore::with_scripted_segments(vec![
            vec![
                records(2),
                records(2),
                records(2),
            ];
            4
        ]));
        let calls = Arc::new(AtomicU64::new(0));
        let items = Arc::new(AtomicU64::new(0));

        let report = Scanner::new(store, "items", 4)
            .start(counting_handler(calls.clone(), items.clone()))
            .wait()
            .await;

        assert!(report.is_complete());
        assert_eq!(report.completed_segments, 4);
        assert_eq!(calls.load(Ordering::Relaxed), 12);
        assert_eq!(items.load(Ordering::Relaxed), 24);
        assert_eq!(report.metrics.pages_scanned, 12);
        assert_eq!(report.metrics.items_processed, 24);
        assert_eq!(report.metrics.completed_segments, 4);
    }

    #[tokio::test]
    async fn test_three_segments_two_pages_each() {
        // Each segment: a page of 5 records with a cursor, then a terminal
        // empty page. The terminal empty batch is still delivered.
        let store = Arc::new(MockStore::with_scripted_segments(vec![
            vec![records(5), records(0)];
            3
        ]));
        let calls = Arc::new(AtomicU64::new(0));
        let items = Arc::new(AtomicU64::new(0));

        let report = Scanner::new(store, "items", 3)
            .start(counting_handler(calls.clone(), items.clone()))
            .wait()
            .await;

        assert_eq!(report.metrics.items_processed, 15);
        assert_eq!(report.metrics.completed_segments, 3);
        assert_eq!(calls.load(Ordering::Relaxed), 6);
    }

    #[tokio::test]
    async fn test_resumption_carries_checkpointed_cursor() {
        let store = Arc::new(MockStore::with_scripted_segments(vec![
            vec![records(1)],
            vec![records(1)],
        ]));
        store.create_table("scan_checkpoints", &["namespace", "segment"]);
        let resume_from: Cursor =
            [("pk".to_string(), AttributeValue::S("item-500".to_string()))].into_iter().collect();
        Checkpoint::new(store.clone(), "scan_checkpoints", "nightly")
            .put(1, &resume_from)
            .await
            .unwrap();

        let report = Scanner::new(store.clone(), "items", 2)
            .with_checkpoint("scan_checkpoints", "nightly")
            .start(Arc::new(|_: Vec<Record>| {}))
            .wait()
            .await;

        assert!(report.is_complete());
        let segment_one = store
            .scan_requests()
            .into_iter()
            .find(|request| request.segment == 1)
            .unwrap();
        assert_eq!(segment_one.start_cursor, Some(resume_from));
        let segment_zero = store
            .scan_requests()
            .into_iter()
            .find(|request| request.segment == 0)
            .unwrap();
        assert_eq!(segment_zero.start_cursor, None);
    }

    #[tokio::test]
    async fn test_checkpoint_overwritten_per_page_holds_latest_cursor() {
        let store = Arc::new(MockStore::with_scripted_segments(vec![vec![
            records(1),
            records(1),
            records(1),
        ]]));
        store.create_table("scan_checkpoints", &["namespace", "segment"]);

        let report = Scanner::new(store.clone(), "items", 1)
            .with_checkpoint("scan_checkpoints", "nightly")
            .start(Arc::new(|_: Vec<Record>| {}))
            .wait()
            .await;

        assert!(report.is_complete());
        let stored = Checkpoint::new(store.clone(), "scan_checkpoints", "nightly")
            .get(0)
            .await
            .unwrap();
        // The cursor of the last non-terminal page wins.
        assert_eq!(stored, Some(MockStore::cursor(0, 1)));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_scans_nothing() {
        let store = Arc::new(MockStore::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(AtomicU64::new(0));
        let items = Arc::new(AtomicU64::new(0));

        let report = Scanner::new(store.clone(), "items", 5)
            .with_cancellation(cancel)
            .start(counting_handler(calls.clone(), items))
            .wait()
            .await;

        assert_eq!(report.cancelled_segments, 5);
        assert_eq!(report.completed_segments, 0);
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert!(store.scan_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_segment_reported_while_others_complete() {
        let store = Arc::new(MockStore::new());
        store.script_segment(0, [Ok(trawl_store::ScanPage::new(records(2), None))]);
        store.script_segment(
            1,
            (0..MAX_CONSECUTIVE_FAILURES).map(|_| Err(StoreErrorKind::Network("reset".to_string()))),
        );

        let report = Scanner::new(store, "items", 2)
            .start(Arc::new(|_: Vec<Record>| {}))
            .wait()
            .await;

        assert!(!report.is_complete());
        assert_eq!(report.completed_segments, 1);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.segment, 1);
        assert!(matches!(&*failure.error, ErrorKind::SegmentFailed { segment: 1, .. }));
    }

    #[tokio::test]
    async fn test_panicking_handler_fails_only_its_segment() {
        let store = Arc::new(MockStore::new());
        store.script_segment(0, [Ok(trawl_store::ScanPage::new(records(2), None))]);
        store.script_segment(
            1,
            [Ok(trawl_store::ScanPage::new(
                vec![Record::new().with("pk", AttributeValue::S("poison".to_string()))],
                None,
            ))],
        );

        let report = Scanner::new(store, "items", 2)
            .start(Arc::new(|batch: Vec<Record>| {
                let poisoned = batch
                    .iter()
                    .any(|record| record.get("pk").and_then(AttributeValue::as_s) == Some("poison"));
                assert!(!poisoned, "handler rejected batch");
            }))
            .wait()
            .await;

        assert!(!report.is_complete());
        assert_eq!(report.completed_segments, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].segment, 1);
        assert!(matches!(&*report.failures[0].error, ErrorKind::WorkerPanicked { segment: 1 }));
    }

    #[tokio::test]
    async fn test_metrics_readable_while_running() {
        let store = Arc::new(MockStore::with_scripted_segments(vec![vec![records(3)]]));
        let scanner = Scanner::new(store, "items", 1);
        let metrics = scanner.metrics();
        let report = scanner.start(Arc::new(|_: Vec<Record>| {})).wait().await;
        assert_eq!(metrics.items_processed(), 3);
        assert_eq!(report.metrics.items_processed, 3);
    }
}
