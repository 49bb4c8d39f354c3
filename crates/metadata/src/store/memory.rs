//! In-memory metadata store for testing.

use crate::error::{ErrorKind, Result};
use crate::record::{MetadataRecord, VersionEntry};
use crate::store::MetadataStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Number of calls each store operation has received.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CallCounts {
    pub fetch: usize,
    pub insert: usize,
    pub update: usize,
    pub list_all: usize,
}

/// In-memory store with the same semantics as [`SqliteStore`](super::SqliteStore).
///
/// Records live in a `HashMap` behind a [`RwLock`]. Every call is counted, and
/// the store can be switched into an "unavailable" mode in which every call
/// fails with [`StoreUnavailable`](ErrorKind::StoreUnavailable), so tests can
/// observe exactly when the store is (and isn't) consulted.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, MetadataRecord>>,
    unavailable: AtomicBool,
    fetches: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    lists: AtomicUsize,
}

impl MemoryStore {
    /// Create a store pre-populated with records.
    pub fn with_records(records: impl IntoIterator<Item = MetadataRecord>) -> Self {
        let records = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            records: RwLock::new(records),
            ..Self::default()
        }
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            fetch: self.fetches.load(Ordering::SeqCst),
            insert: self.inserts.load(Ordering::SeqCst),
            update: self.updates.load(Ordering::SeqCst),
            list_all: self.lists.load(Ordering::SeqCst),
        }
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    fn enter(&self, counter: &AtomicUsize) -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::StoreUnavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch(&self, id: &str) -> Result<Option<MetadataRecord>> {
        self.enter(&self.fetches)?;
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn insert(&self, record: &MetadataRecord) -> Result<()> {
        self.enter(&self.inserts)?;
        let mut guard = self.records.write().await;
        if guard.contains_key(&record.id) {
            exn::bail!(ErrorKind::Conflict(record.id.clone()));
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &MetadataRecord) -> Result<()> {
        self.enter(&self.updates)?;
        let mut guard = self.records.write().await;
        let Some(existing) = guard.get_mut(&record.id) else {
            exn::bail!(ErrorKind::NotFound(record.id.clone()));
        };
        if record.version <= existing.version {
            exn::bail!(ErrorKind::VersionRegression(record.id.clone()));
        }
        existing.version = record.version;
        existing.manifest_hash = record.manifest_hash.clone();
        existing.library_version = record.library_version.clone();
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<VersionEntry>> {
        self.enter(&self.lists)?;
        Ok(self.records.read().await.values().map(VersionEntry::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_and_unavailable() {
        let record = MetadataRecord::new("http://a.example/manifest.webapp", "a", "0.0.7");
        let store = MemoryStore::with_records([record.clone()]);
        assert_eq!(store.fetch(&record.id).await.unwrap(), Some(record.clone()));
        store.set_unavailable(true);
        let err = store.fetch(&record.id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::StoreUnavailable));
        store.set_unavailable(false);
        assert_eq!(store.calls(), CallCounts { fetch: 2, ..CallCounts::default() });
    }

    #[tokio::test]
    async fn test_update_semantics_match_sqlite() {
        let record = MetadataRecord::new("http://a.example/manifest.webapp", "a", "0.0.7");
        let store = MemoryStore::default();
        let err = store.update(&record).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        store.insert(&record).await.unwrap();
        let err = store.insert(&record).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Conflict(_)));
        let err = store.update(&record).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::VersionRegression(_)));
        store.update(&record.rebuilt("b")).await.unwrap();
        assert_eq!(store.fetch(&record.id).await.unwrap().unwrap().version, 2);
        assert_eq!(store.len().await, 1);
    }
}
