//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do* (retry forever, retry a
/// bounded number of times, give up), not what went wrong internally.
/// Payloads are plain strings so scripted test backends can clone them.
#[derive(Clone, Debug, Display, Error)]
pub enum ErrorKind {
    /// The store rejected the request because allocated capacity was
    /// exceeded. Always retriable; the caller backs off and reissues the
    /// identical request.
    #[display("store throttled the request: {_0}")]
    Throttled(#[error(not(source))] String),
    /// Network-level failure (connection, timeout) before a store response
    /// was received.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The store answered with an error that is not a capacity signal.
    #[display("backend error: {_0}")]
    Backend(#[error(not(source))] String),
    /// The named table does not exist. Fatal misconfiguration.
    #[display("table not found: {_0}")]
    TableNotFound(#[error(not(source))] String),
    /// A record or cursor could not be represented in the store's native
    /// attribute model.
    #[display("invalid record: {_0}")]
    InvalidRecord(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` for capacity errors that must be retried with
    /// backoff, indefinitely, without surfacing to the caller.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Network(_) | Self::Backend(_))
    }
}
