//! Bounded in-process TTL cache for metadata records.
//!
//! The cache only ever sits in front of the store for reads. Two rules keep
//! it from serving stale data:
//!
//! - An entry past its expiry is indistinguishable from a missing entry.
//! - An invalidation beats any read-through fill that was started before it.
//!   Readers take a [`FillTicket`] *before* going to the store and hand it
//!   back with the fetched record. Every [`delete`](TtlCache::delete) bumps a
//!   sequence number and leaves a tombstone for its key; a fill whose ticket
//!   predates a tombstone for the same key is dropped.
//!
//! Tombstones are bounded like entries. When one is forgotten, its sequence
//! number becomes a floor and every fill ticketed below it is dropped. That
//! can cost an extra store round trip, never a stale hit.
//!
//! Entries are kept in an [`IndexMap`] in recency order (front is the least
//! recently used), which gives deterministic LRU eviction.

use crate::record::MetadataRecord;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

// Expiry used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Proof of when a read-through fill started.
///
/// Obtained from [`TtlCache::ticket`] before the store is queried.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FillTicket(u64);

/// Point-in-time counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Reads that found an entry past its expiry.
    pub expirations: u64,
    /// Entries dropped to stay within capacity.
    pub evictions: u64,
    /// Read-through fills refused because an invalidation overtook them.
    pub rejected_fills: u64,
}

struct Entry {
    record: MetadataRecord,
    expires_at: Instant,
}

struct Inner {
    entries: IndexMap<String, Entry>,
    tombstones: IndexMap<String, u64>,
    /// Highest sequence number among forgotten tombstones.
    floor: u64,
    sequence: u64,
    stats: CacheStats,
}

pub struct TtlCache {
    inner: Mutex<Inner>,
    max_entries: usize,
}

impl TtlCache {
    /// Create an empty cache holding at most `max_entries` records (at least one).
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            inner: Mutex::new(Inner {
                entries: IndexMap::with_capacity(max_entries.min(1024)),
                tombstones: IndexMap::new(),
                floor: 0,
                sequence: 0,
                stats: CacheStats::default(),
            }),
            max_entries,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Return the cached record for `id` if it has not expired.
    ///
    /// An expired entry is removed on the spot. A hit marks the entry as most
    /// recently used.
    pub fn get(&self, id: &str) -> Option<MetadataRecord> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(index) = inner.entries.get_index_of(id) else {
            inner.stats.misses += 1;
            return None;
        };
        if inner.entries[index].expires_at <= now {
            inner.entries.shift_remove_index(index);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            return None;
        }
        let last = inner.entries.len() - 1;
        inner.entries.move_index(index, last);
        inner.stats.hits += 1;
        Some(inner.entries[last].record.clone())
    }

    /// Insert or replace the entry for `id`, expiring `ttl` from now.
    pub fn set(&self, id: impl Into<String>, record: MetadataRecord, ttl: Duration) {
        let mut guard = self.inner.lock();
        Self::store(&mut guard, self.max_entries, id.into(), record, ttl);
    }

    /// Start a read-through fill. Take the ticket *before* querying the store.
    pub fn ticket(&self) -> FillTicket {
        FillTicket(self.inner.lock().sequence)
    }

    /// Insert a record fetched under `ticket`, unless `id` was invalidated
    /// after the ticket was issued.
    ///
    /// Returns `false` when the fill was refused.
    pub fn fill(&self, id: impl Into<String>, ticket: FillTicket, record: MetadataRecord, ttl: Duration) -> bool {
        let id = id.into();
        let mut guard = self.inner.lock();
        let overtaken = ticket.0 < guard.floor || guard.tombstones.get(&id).is_some_and(|seq| *seq > ticket.0);
        if overtaken {
            guard.stats.rejected_fills += 1;
            return false;
        }
        Self::store(&mut guard, self.max_entries, id, record, ttl);
        true
    }

    /// Remove the entry for `id`, expired or not, and fence off any fill for
    /// `id` that is still in flight.
    ///
    /// Returns `true` if an entry was present.
    pub fn delete(&self, id: &str) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.sequence += 1;
        let removed = inner.entries.shift_remove(id).is_some();
        inner.tombstones.shift_remove(id);
        inner.tombstones.insert(id.to_string(), inner.sequence);
        while inner.tombstones.len() > self.max_entries {
            if let Some((_, seq)) = inner.tombstones.shift_remove_index(0) {
                inner.floor = inner.floor.max(seq);
            }
        }
        removed
    }

    /// Drop every entry and refuse every fill that is currently in flight.
    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        guard.sequence += 1;
        guard.floor = guard.sequence;
        guard.entries.clear();
        guard.tombstones.clear();
    }

    /// Number of occupied slots, including expired entries not yet reclaimed.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    fn store(inner: &mut Inner, max_entries: usize, id: String, record: MetadataRecord, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE);
        if !inner.entries.contains_key(&id) && inner.entries.len() >= max_entries {
            inner.entries.shift_remove_index(0);
            inner.stats.evictions += 1;
        }
        let (index, _) = inner.entries.insert_full(id, Entry { record, expires_at });
        let last = inner.entries.len() - 1;
        inner.entries.move_index(index, last);
    }
}
