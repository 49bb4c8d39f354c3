//! Metadata Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A metadata error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// A record that simply does not exist is never an error on the read path;
/// lookups return `Ok(None)` instead.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The store could not be reached, or the connection failed mid-query.
    /// Never retried here; retry policy belongs to the caller.
    #[display("metadata store unavailable")]
    StoreUnavailable,
    #[display("database migration error")]
    Migration,
    /// Insert for an identifier that already has a record; use an update.
    #[display("metadata already recorded: ({_0})")]
    Conflict(#[error(not(source))] String),
    /// Update for an identifier that has no record; use an insert.
    #[display("metadata not found: ({_0})")]
    NotFound(#[error(not(source))] String),
    /// Update whose version is not strictly greater than the stored one.
    #[display("version must increase: ({_0})")]
    VersionRegression(#[error(not(source))] String),
    /// Record rejected before any I/O because a required attribute is empty.
    #[display("malformed record: missing {_0}")]
    MalformedRecord(#[error(not(source))] &'static str),
    /// A stored row could not be converted back into a record.
    #[display("invalid metadata data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable)
    }
}
