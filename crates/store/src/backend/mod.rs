//! Store backend trait and implementations.
//!
//! This module defines the `ScanStore` trait, which is the entire surface
//! the scan core needs from a partitioned document store: segmented scan
//! plus keyed record get/put (the latter pair is what checkpoint
//! persistence is built on).

#[cfg(feature = "dynamodb")]
mod dynamodb;
#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "dynamodb")]
pub use self::dynamodb::DynamoBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockStore;
use crate::error::Result;
use crate::models::{Record, ScanPage, ScanRequest};
use async_trait::async_trait;

/// Unified interface for partitioned document store backends.
///
/// All operations are asynchronous network calls. Implementations must be
/// safe for concurrent use from every segment worker at once; they are
/// shared behind an [`Arc`](std::sync::Arc) and expected to provide their
/// own connection pooling.
///
/// # Segments
/// A scan request names a segment index and the fixed total segment count;
/// the store partitions the table's key space disjointly across segments
/// by construction, which is what lets segment workers run as pure,
/// independent retry loops with no cross-worker coordination.
///
/// # Examples
///
/// ```
/// use trawl_store::{ScanRequest, ScanStore, error::Result};
///
/// async fn first_page_len(store: &dyn ScanStore, table: &str) -> Result<usize> {
///     let page = store
///         .scan(&ScanRequest {
///             table: table.to_string(),
///             segment: 0,
///             total_segments: 4,
///             start_cursor: None,
///             consistent: false,
///         })
///         .await?;
///     Ok(page.records.len())
/// }
/// ```
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Fetch one page of one segment's scan.
    ///
    /// The returned page's `next_cursor` must be passed back unmodified on
    /// the next call for the same segment; `None` means the segment is
    /// exhausted. Errors are classified by
    /// [`ErrorKind`](crate::error::ErrorKind) so the caller can decide
    /// between indefinite backoff (throttling), bounded retry, and fatal.
    async fn scan(&self, request: &ScanRequest) -> Result<ScanPage>;

    /// Point lookup of a single record by its key attributes.
    ///
    /// `consistent` requests a strongly-consistent read. Checkpoint reads
    /// rely on this: a stale cursor is safe but wasteful, so resumption
    /// always reads consistently.
    async fn get_record(&self, table: &str, key: &Record, consistent: bool) -> Result<Option<Record>>;

    /// Upsert a single record, replacing any record with the same key.
    /// Last writer wins; writing an identical record twice is harmless.
    async fn put_record(&self, table: &str, record: Record) -> Result<()>;
}
