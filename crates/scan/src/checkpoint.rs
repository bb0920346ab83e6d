//! Durable per-segment progress checkpoints.
//!
//! One row per (namespace, segment) in a dedicated table of the same
//! store class being scanned: `{namespace: S, segment: N, cursor: M}`.
//! Rows are overwritten on every successfully handled page, so a resumed
//! run re-reads at most one page per segment. Segments never share rows,
//! so concurrent writes from different workers need no mutual exclusion.

use crate::backoff::Backoff;
use crate::error::{ErrorKind, Result};
use tracing::debug;
use trawl_store::{AttributeValue, Cursor, Record, StoreHandle};

/// Attribute holding the serialized continuation cursor.
const CURSOR_ATTR: &str = "cursor";

/// Attempts per checkpoint operation, throttled or not. Bounded so a
/// sustained outage surfaces to the worker (which logs it and keeps its
/// in-memory progress) instead of retrying forever under a page it has
/// already handled.
const MAX_ATTEMPTS: u32 = 8;

/// Durable mapping from (namespace, segment) to continuation cursor.
///
/// The namespace scopes checkpoints to one logical scan configuration, so
/// independent jobs over the same table don't collide. The segment count
/// the cursors were written under must match the count of the resuming
/// run; segment key ranges are a function of it.
pub struct Checkpoint {
    store: StoreHandle,
    table: String,
    namespace: String,
}

impl Checkpoint {
    pub fn new(store: StoreHandle, table: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { store, table: table.into(), namespace: namespace.into() }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The last checkpointed cursor for `segment`, or `None` if the
    /// segment has never checkpointed under this namespace.
    ///
    /// Reads strongly-consistently: a stale read could resurrect an older
    /// cursor, which is safe (cursors only move forward) but wasteful.
    pub async fn get(&self, segment: usize) -> Result<Option<Cursor>> {
        let key = self.key(segment);
        let mut backoff = Backoff::default();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.store.get_record(&self.table, &key, true).await {
                Ok(None) => return Ok(None),
                Ok(Some(row)) => {
                    return match row.get(CURSOR_ATTR) {
                        None => Ok(None),
                        Some(value) => match value.as_m() {
                            Some(map) => Ok(Some(Cursor::new(map.clone()))),
                            None => Err(exn::Exn::from(ErrorKind::CheckpointGet { segment })),
                        },
                    };
                },
                Err(err) if err.is_retryable() && attempts < MAX_ATTEMPTS => {
                    debug!(segment, attempts, "retrying checkpoint read");
                    tokio::time::sleep(backoff.next_delay()).await;
                },
                Err(err) => return Err(err.raise(ErrorKind::CheckpointGet { segment })),
            }
        }
    }

    /// Overwrite the checkpoint row for `segment` with `cursor`.
    ///
    /// Idempotent, last writer wins; under the one-run-per-namespace
    /// assumption each segment has exactly one writer anyway.
    pub async fn put(&self, segment: usize, cursor: &Cursor) -> Result<()> {
        let row = self.key(segment).with(CURSOR_ATTR, AttributeValue::M(cursor.attributes().clone()));
        let mut backoff = Backoff::default();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.store.put_record(&self.table, row.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempts < MAX_ATTEMPTS => {
                    debug!(segment, attempts, "retrying checkpoint write");
                    tokio::time::sleep(backoff.next_delay()).await;
                },
                Err(err) => return Err(err.raise(ErrorKind::CheckpointPut { segment })),
            }
        }
    }

    fn key(&self, segment: usize) -> Record {
        Record::new()
            .with("namespace", AttributeValue::S(self.namespace.clone()))
            .with("segment", AttributeValue::N(segment.to_string()))
    }
}
