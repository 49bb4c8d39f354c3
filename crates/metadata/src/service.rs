//! Read-through / write-through access to build metadata.

use crate::error::Result;
use crate::record::{MetadataRecord, manifest_id};
use crate::staleness::StalenessDetector;
use crate::store::StoreHandle;
use crate::ttl::{CacheStats, TtlCache};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Lifetime and capacity of the service's cache.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub max_entries: usize,
}
impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_entries: 5000,
        }
    }
}

/// What has to happen for a manifest given its current content.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BuildPlan {
    /// Never built before; `0` is the record to insert after a build.
    Create(MetadataRecord),
    /// Content or toolchain changed since the last build.
    Rebuild {
        previous: MetadataRecord,
        next: MetadataRecord,
    },
    /// The recorded build is current.
    UpToDate(MetadataRecord),
}
impl BuildPlan {
    pub fn needs_build(&self) -> bool {
        !matches!(self, Self::UpToDate(_))
    }

    /// The record that will be current once the plan is carried out.
    pub fn target(&self) -> &MetadataRecord {
        match self {
            Self::Create(record) | Self::UpToDate(record) => record,
            Self::Rebuild { next, .. } => next,
        }
    }
}

struct Inner {
    store: StoreHandle,
    cache: TtlCache,
    ttl: Duration,
}

/// Build metadata with a TTL cache in front of the store.
///
/// Reads go to the cache first and fall back to the store, repopulating the
/// cache on the way out. Writes drop the cache entry *before* the store is
/// touched and again after it answers, whether or not the store call
/// succeeded, so a read that follows a completed write always observes the
/// store.
///
/// The cache belongs to this service instance; clones share it.
///
/// # Examples
///
/// ```no_run
/// use packd_metadata::{CacheSettings, Database, MetadataRecord, MetadataService, SqliteStore};
/// use std::sync::Arc;
///
/// # async fn example() -> packd_metadata::error::Result<()> {
/// let db = Database::connect("packd.db").await?;
/// let service = MetadataService::new(Arc::new(SqliteStore::from(&db)), CacheSettings::default());
///
/// let record = MetadataRecord::new("https://example.com/manifest.webapp", "c0ffee", "0.0.7");
/// service.save_metadata(&record).await?;
/// assert_eq!(service.get_metadata(&record.id).await?, Some(record));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MetadataService {
    inner: Arc<Inner>,
}

impl MetadataService {
    pub fn new(store: StoreHandle, settings: CacheSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                cache: TtlCache::new(settings.max_entries),
                ttl: settings.ttl,
            }),
        }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.inner.store
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Look up the record for `id`.
    ///
    /// Returns `Ok(None)` when the store has no record. Absence is never
    /// cached, so the next lookup asks the store again.
    #[instrument(level = "debug", skip(self), fields(store = self.inner.store.name()))]
    pub async fn get_metadata(&self, id: &str) -> Result<Option<MetadataRecord>> {
        if let Some(record) = self.inner.cache.get(id) {
            tracing::debug!(version = record.version, "Metadata cache hit");
            return Ok(Some(record));
        }
        let ticket = self.inner.cache.ticket();
        let record = self.inner.store.fetch(id).await?;
        match &record {
            Some(record) => {
                if self.inner.cache.fill(id, ticket, record.clone(), self.inner.ttl) {
                    tracing::debug!(version = record.version, "Metadata cache miss; cached store value");
                } else {
                    tracing::warn!(version = record.version, "Metadata invalidated during fetch; not cached");
                }
            },
            None => tracing::debug!("Metadata not found in store"),
        }
        Ok(record)
    }

    /// Record the first build of a manifest.
    ///
    /// Fails with [`Conflict`](crate::error::ErrorKind::Conflict) if a record
    /// already exists; use [`update_metadata`](Self::update_metadata) then.
    #[instrument(skip(self, record), fields(id = %record.id, version = record.version))]
    pub async fn save_metadata(&self, record: &MetadataRecord) -> Result<()> {
        record.validate()?;
        self.invalidate(&record.id);
        let result = self.inner.store.insert(record).await;
        self.invalidate(&record.id);
        result?;
        tracing::info!(manifest_url = %record.manifest_url, "Saved build metadata");
        Ok(())
    }

    /// Record a rebuild of a manifest that already has a record.
    ///
    /// Fails with [`NotFound`](crate::error::ErrorKind::NotFound) if there is
    /// no prior record.
    #[instrument(skip(self, record), fields(id = %record.id, version = record.version))]
    pub async fn update_metadata(&self, record: &MetadataRecord) -> Result<()> {
        record.validate()?;
        self.invalidate(&record.id);
        let result = self.inner.store.update(record).await;
        self.invalidate(&record.id);
        result?;
        tracing::info!(manifest_url = %record.manifest_url, "Updated build metadata");
        Ok(())
    }

    /// Manifest URLs whose installed version is behind the recorded one.
    ///
    /// Reads the store directly; see [`StalenessDetector`].
    pub async fn find_outdated(&self, installed: &HashMap<String, u64>) -> Result<BTreeSet<String>> {
        StalenessDetector::new(self.inner.store.clone()).find_outdated(installed).await
    }

    /// Decide whether `manifest_url` needs building, given the hash of its
    /// current content and the toolchain that would build it.
    #[instrument(level = "debug", skip(self))]
    pub async fn plan_build(&self, manifest_url: &str, manifest_hash: &str, library_version: &str) -> Result<BuildPlan> {
        let id = manifest_id(manifest_url);
        let plan = match self.get_metadata(&id).await? {
            None => BuildPlan::Create(MetadataRecord::new(manifest_url, manifest_hash, library_version)),
            Some(previous) if previous.manifest_hash == manifest_hash && previous.library_version == library_version => {
                BuildPlan::UpToDate(previous)
            },
            Some(previous) => {
                let next = previous.rebuilt_with_library(manifest_hash, library_version);
                BuildPlan::Rebuild { previous, next }
            },
        };
        Ok(plan)
    }

    /// Persist the outcome of a successful build carried out for `plan`.
    ///
    /// Returns the record that is now current.
    pub async fn record_build(&self, plan: BuildPlan) -> Result<MetadataRecord> {
        match plan {
            BuildPlan::Create(record) => {
                self.save_metadata(&record).await?;
                Ok(record)
            },
            BuildPlan::Rebuild { next, .. } => {
                self.update_metadata(&next).await?;
                Ok(next)
            },
            BuildPlan::UpToDate(record) => Ok(record),
        }
    }

    fn invalidate(&self, id: &str) {
        // Runs before the store call and again once it returns, on success
        // and failure alike: a fill ticketed while the write was in flight
        // may carry the old row and must lose.
        let removed = self.inner.cache.delete(id);
        tracing::debug!(id, removed, "Invalidated metadata cache entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::record::VersionEntry;
    use crate::store::{MemoryStore, MetadataStore};
    use async_trait::async_trait;
    use tokio::sync::{Notify, oneshot};

    const TTL: Duration = Duration::from_secs(30);
    const DESRE: &str = "http://people.mozilla.org/~fdesre/openwebapps/package.manifest";
    const DELTRON: &str = "http://deltron3030.testmanifest.com/manifest.webapp";

    fn service_with(store: Arc<MemoryStore>) -> MetadataService {
        MetadataService::new(store, CacheSettings { ttl: TTL, max_entries: 100 })
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_skips_store() {
        let record = MetadataRecord::new(DESRE, "hash-a", "0.0.7");
        let store = Arc::new(MemoryStore::with_records([record.clone()]));
        let service = service_with(store.clone());
        assert_eq!(service.get_metadata(&record.id).await.unwrap(), Some(record.clone()));
        assert_eq!(service.get_metadata(&record.id).await.unwrap(), Some(record.clone()));
        assert_eq!(store.calls().fetch, 1);
        assert_eq!(service.cache_stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_falls_through_to_store() {
        let record = MetadataRecord::new(DESRE, "hash-a", "0.0.7");
        let store = Arc::new(MemoryStore::with_records([record.clone()]));
        let service = service_with(store.clone());
        service.get_metadata(&record.id).await.unwrap();
        tokio::time::advance(TTL).await;
        service.get_metadata(&record.id).await.unwrap();
        assert_eq!(store.calls().fetch, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_after_update_sees_new_version() {
        let record = MetadataRecord::new(DESRE, "hash-a", "0.0.7");
        let store = Arc::new(MemoryStore::with_records([record.clone()]));
        let service = service_with(store.clone());
        // Warm the cache; plenty of TTL left afterwards.
        service.get_metadata(&record.id).await.unwrap();
        let next = record.rebuilt("hash-b");
        service.update_metadata(&next).await.unwrap();
        let seen = service.get_metadata(&record.id).await.unwrap().unwrap();
        assert_eq!(seen.version, 2);
        assert_eq!(seen.library_version, "0.0.7");
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_miss_is_not_cached() {
        let store = Arc::new(MemoryStore::default());
        let service = service_with(store.clone());
        let id = manifest_id(DESRE);
        for _ in 0..3 {
            assert_eq!(service.get_metadata(&id).await.unwrap(), None);
        }
        assert_eq!(store.calls().fetch, 3);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_conflict_still_invalidates() {
        let record = MetadataRecord::new(DESRE, "hash-a", "0.0.7");
        let store = Arc::new(MemoryStore::with_records([record.clone()]));
        let service = service_with(store.clone());
        service.get_metadata(&record.id).await.unwrap();
        let err = service.save_metadata(&record).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Conflict(_)));
        service.get_metadata(&record.id).await.unwrap();
        assert_eq!(store.calls().fetch, 2, "failed write must still drop the cache entry");
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_missing_is_not_found() {
        let store = Arc::new(MemoryStore::default());
        let service = service_with(store.clone());
        let err = service.update_metadata(&MetadataRecord::new(DESRE, "hash-a", "0.0.7")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_record_rejected_before_io() {
        let store = Arc::new(MemoryStore::default());
        let service = service_with(store.clone());
        let mut record = MetadataRecord::new(DESRE, "hash-a", "0.0.7");
        record.manifest_hash.clear();
        let err = service.save_metadata(&record).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::MalformedRecord("manifest_hash")));
        let err = service.update_metadata(&record).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::MalformedRecord("manifest_hash")));
        assert_eq!(store.calls().insert + store.calls().update, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_unavailable_propagates() {
        let record = MetadataRecord::new(DESRE, "hash-a", "0.0.7");
        let store = Arc::new(MemoryStore::with_records([record.clone()]));
        let service = service_with(store.clone());
        service.get_metadata(&record.id).await.unwrap();
        store.set_unavailable(true);
        // Cached reads keep working; writes and misses surface the failure.
        assert!(service.get_metadata(&record.id).await.unwrap().is_some());
        let err = service.update_metadata(&record.rebuilt("hash-b")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::StoreUnavailable));
        let err = service.get_metadata(&record.id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::StoreUnavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_to_different_ids_are_isolated() {
        let desre = MetadataRecord::new(DESRE, "hash-a", "0.0.7");
        let deltron = MetadataRecord::new(DELTRON, "hash-x", "0.0.7");
        let store = Arc::new(MemoryStore::default());
        let service = service_with(store.clone());
        service.save_metadata(&desre).await.unwrap();
        service.save_metadata(&deltron).await.unwrap();
        service.get_metadata(&desre.id).await.unwrap();
        service.get_metadata(&deltron.id).await.unwrap();
        service.update_metadata(&deltron.rebuilt("hash-y")).await.unwrap();
        assert_eq!(service.get_metadata(&desre.id).await.unwrap(), Some(desre));
        assert_eq!(service.get_metadata(&deltron.id).await.unwrap().unwrap().version, 2);
        // desre stayed cached: one fetch to warm it, none after the deltron update.
        assert_eq!(store.calls().fetch, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plan_and_record_builds() {
        let store = Arc::new(MemoryStore::default());
        let service = service_with(store.clone());

        let plan = service.plan_build(DESRE, "hash-a", "0.0.7").await.unwrap();
        assert!(matches!(&plan, BuildPlan::Create(r) if r.version == 1));
        let first = service.record_build(plan).await.unwrap();

        let plan = service.plan_build(DESRE, "hash-a", "0.0.7").await.unwrap();
        assert_eq!(plan, BuildPlan::UpToDate(first.clone()));
        assert!(!plan.needs_build());

        let plan = service.plan_build(DESRE, "hash-b", "0.0.7").await.unwrap();
        let second = service.record_build(plan).await.unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.library_version, "0.0.7");

        let plan = service.plan_build(DESRE, "hash-b", "0.0.8").await.unwrap();
        assert!(plan.needs_build());
        assert_eq!(plan.target().version, 3);
        let third = service.record_build(plan).await.unwrap();
        assert_eq!(service.get_metadata(&third.id).await.unwrap(), Some(third));
    }

    /// Store whose `fetch` reads its answer immediately, then parks until
    /// released, so a write can be slotted in between.
    struct ParkedFetchStore {
        store: MemoryStore,
        fetched: Notify,
        release: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl MetadataStore for ParkedFetchStore {
        fn name(&self) -> &str {
            "parked"
        }

        async fn fetch(&self, id: &str) -> Result<Option<MetadataRecord>> {
            let answer = self.store.fetch(id).await?;
            let release = self.release.lock().await.take();
            if let Some(release) = release {
                self.fetched.notify_one();
                let _ = release.await;
            }
            Ok(answer)
        }

        async fn insert(&self, record: &MetadataRecord) -> Result<()> {
            self.store.insert(record).await
        }

        async fn update(&self, record: &MetadataRecord) -> Result<()> {
            self.store.update(record).await
        }

        async fn list_all(&self) -> Result<Vec<VersionEntry>> {
            self.store.list_all().await
        }
    }

    #[tokio::test]
    async fn test_invalidation_wins_over_in_flight_fill() {
        let record = MetadataRecord::new(DESRE, "hash-a", "0.0.7");
        let (release_tx, release_rx) = oneshot::channel();
        let store = Arc::new(ParkedFetchStore {
            store: MemoryStore::with_records([record.clone()]),
            fetched: Notify::new(),
            release: tokio::sync::Mutex::new(Some(release_rx)),
        });
        let service = MetadataService::new(store.clone(), CacheSettings { ttl: TTL, max_entries: 100 });

        // Reader misses the cache and reads version 1 from the store...
        let reader = tokio::spawn({
            let service = service.clone();
            let id = record.id.clone();
            async move { service.get_metadata(&id).await }
        });
        store.fetched.notified().await;
        // ...a rebuild is recorded before the reader gets to fill the cache...
        service.update_metadata(&record.rebuilt("hash-b")).await.unwrap();
        release_tx.send(()).unwrap();
        let stale = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(stale.version, 1);

        // ...and the reader's stale value must not have been cached.
        let seen = service.get_metadata(&record.id).await.unwrap().unwrap();
        assert_eq!(seen.version, 2);
        assert_eq!(service.cache_stats().rejected_fills, 1);
    }

    /// Store whose `update` parks before applying the write, so reads can be
    /// slotted in while the write is in flight.
    struct ParkedUpdateStore {
        store: MemoryStore,
        entered: Notify,
        release: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl MetadataStore for ParkedUpdateStore {
        fn name(&self) -> &str {
            "parked-update"
        }

        async fn fetch(&self, id: &str) -> Result<Option<MetadataRecord>> {
            self.store.fetch(id).await
        }

        async fn insert(&self, record: &MetadataRecord) -> Result<()> {
            self.store.insert(record).await
        }

        async fn update(&self, record: &MetadataRecord) -> Result<()> {
            let release = self.release.lock().await.take();
            if let Some(release) = release {
                self.entered.notify_one();
                let _ = release.await;
            }
            self.store.update(record).await
        }

        async fn list_all(&self) -> Result<Vec<VersionEntry>> {
            self.store.list_all().await
        }
    }

    #[tokio::test]
    async fn test_read_during_write_is_not_served_after_it() {
        let record = MetadataRecord::new(DESRE, "hash-a", "0.0.7");
        let (release_tx, release_rx) = oneshot::channel();
        let store = Arc::new(ParkedUpdateStore {
            store: MemoryStore::with_records([record.clone()]),
            entered: Notify::new(),
            release: tokio::sync::Mutex::new(Some(release_rx)),
        });
        let service = MetadataService::new(store.clone(), CacheSettings { ttl: TTL, max_entries: 100 });

        let writer = tokio::spawn({
            let service = service.clone();
            let next = record.rebuilt("hash-b");
            async move { service.update_metadata(&next).await }
        });
        store.entered.notified().await;
        // The write has invalidated but not committed; this read caches v1.
        let during = service.get_metadata(&record.id).await.unwrap().unwrap();
        assert_eq!(during.version, 1);
        release_tx.send(()).unwrap();
        writer.await.unwrap().unwrap();

        let after = service.get_metadata(&record.id).await.unwrap().unwrap();
        assert_eq!(after.version, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_drops_entry_filled_meanwhile() {
        let record = MetadataRecord::new(DESRE, "hash-a", "0.0.7");
        let (release_tx, release_rx) = oneshot::channel();
        let store = Arc::new(ParkedUpdateStore {
            store: MemoryStore::with_records([record.clone()]),
            entered: Notify::new(),
            release: tokio::sync::Mutex::new(Some(release_rx)),
        });
        let service = MetadataService::new(store.clone(), CacheSettings { ttl: TTL, max_entries: 100 });

        // Same version again: the store rejects it once released.
        let writer = tokio::spawn({
            let service = service.clone();
            let same = record.clone();
            async move { service.update_metadata(&same).await }
        });
        store.entered.notified().await;
        service.get_metadata(&record.id).await.unwrap();
        release_tx.send(()).unwrap();
        let err = writer.await.unwrap().unwrap_err();
        assert!(matches!(&*err, ErrorKind::VersionRegression(_)));

        service.get_metadata(&record.id).await.unwrap();
        assert_eq!(service.cache_stats().hits, 0);
    }
}
