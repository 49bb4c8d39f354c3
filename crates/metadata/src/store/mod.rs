//! Persistent metadata store trait and implementations.
//!
//! The store is the system of record. It knows nothing about caching; the
//! [`MetadataService`](crate::MetadataService) layers the TTL cache on top.

#[cfg(any(test, feature = "mock"))]
mod memory;
mod sqlite;

#[cfg(any(test, feature = "mock"))]
pub use self::memory::{CallCounts, MemoryStore};
pub use self::sqlite::SqliteStore;
use crate::error::Result;
use crate::record::{MetadataRecord, VersionEntry};
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle to a store, as held by the service and the staleness detector.
pub type StoreHandle = Arc<dyn MetadataStore + Send + Sync>;

/// Durable table of one record per tracked manifest.
///
/// Every method is one logical operation: implementations acquire whatever
/// connection they need for the call and release it before returning, on
/// success and failure alike.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Name of the store implementation (used for logging only).
    fn name(&self) -> &str;

    /// Point lookup by identifier.
    ///
    /// Returns `Ok(None)` when no record exists.
    async fn fetch(&self, id: &str) -> Result<Option<MetadataRecord>>;

    /// Create the record for a new identifier.
    ///
    /// Returns [`Conflict`](crate::error::ErrorKind::Conflict) if a record
    /// with the same `id` already exists.
    async fn insert(&self, record: &MetadataRecord) -> Result<()>;

    /// Replace `version`, `manifest_hash` and `library_version` of an
    /// existing record. `manifest_url` is never rewritten.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if no record
    /// exists for `record.id`, or
    /// [`VersionRegression`](crate::error::ErrorKind::VersionRegression) if
    /// `record.version` is not greater than the stored version.
    async fn update(&self, record: &MetadataRecord) -> Result<()>;

    /// Full scan of `(id, version, manifest_url)` for every record.
    async fn list_all(&self) -> Result<Vec<VersionEntry>>;
}
