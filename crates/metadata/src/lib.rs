//! Versioned build metadata for packaged apps.
//!
//! Every tracked manifest has exactly one [`MetadataRecord`], keyed by an
//! identifier derived from its URL. The record says which build is current:
//! a monotonically increasing version, the hash of the manifest content that
//! produced it, and the packaging toolchain version used.
//!
//! # Architecture
//! - **Store**: the durable table of records behind the [`MetadataStore`]
//!   trait. [`SqliteStore`] is the production implementation.
//! - **Cache**: a bounded [`TtlCache`] in front of point lookups. It may lag
//!   the store by at most its TTL, and never past a write made through the
//!   same [`MetadataService`].
//! - **Staleness**: [`StalenessDetector`] compares a client's installed
//!   versions against a full store scan, bypassing the cache.

mod db;
pub mod error;
mod models;
mod record;
mod service;
mod staleness;
pub mod store;
mod ttl;

pub use crate::db::Database;
pub use crate::record::{MetadataRecord, VersionEntry, manifest_id};
pub use crate::service::{BuildPlan, CacheSettings, MetadataService};
pub use crate::staleness::{InstalledRequest, OutdatedResponse, StalenessDetector};
#[cfg(any(test, feature = "mock"))]
pub use crate::store::MemoryStore;
pub use crate::store::{MetadataStore, SqliteStore, StoreHandle};
pub use crate::ttl::{CacheStats, FillTicket, TtlCache};
