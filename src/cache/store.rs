//! Shared response store.
//!
//! Holds the most recent successfully decoded value per request key. Entries
//! are never evicted, expired, or invalidated; the only way a value changes is
//! a new successful fetch for the same key.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use tracing::debug;

use super::config::WritePolicy;
use super::keys::RequestKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

const METRIC_CACHE_HIT: &str = "fetchbind_cache_hit_total";
const METRIC_CACHE_MISS: &str = "fetchbind_cache_miss_total";
const METRIC_CACHE_WRITE: &str = "fetchbind_cache_write_total";
const METRIC_CACHE_WRITE_SUPERSEDED: &str = "fetchbind_cache_write_superseded_total";

/// Monotonic issue order of a request within one store.
pub type Sequence = u64;

struct CachedValue<V> {
    value: V,
    sequence: Sequence,
}

/// Result of a write into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The key had no value before.
    Inserted,
    /// A previous value was overwritten.
    Replaced,
    /// The write was older than the stored value and was dropped.
    Superseded,
}

/// Process-wide cache shared by every coordinator.
///
/// Created once by the host and passed around as `Arc<CacheStore<V>>`.
pub struct CacheStore<V> {
    entries: RwLock<HashMap<RequestKey, CachedValue<V>>>,
    sequence: AtomicU64,
}

impl<V: Clone> CacheStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Look up the cached value for `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = rw_read(&self.entries, SOURCE, "get")
            .get(key)
            .map(|entry| entry.value.clone());

        if value.is_some() {
            counter!(METRIC_CACHE_HIT).increment(1);
        } else {
            counter!(METRIC_CACHE_MISS).increment(1);
        }
        value
    }

    pub fn contains(&self, key: &str) -> bool {
        rw_read(&self.entries, SOURCE, "contains").contains_key(key)
    }

    /// Unconditionally overwrite the value for `key`.
    pub fn put(&self, key: RequestKey, value: V) -> WriteOutcome {
        let sequence = self.next_sequence();
        self.record(key, value, sequence, WritePolicy::LastSettled)
    }

    /// Reserve the issue sequence for a new request.
    pub fn next_sequence(&self) -> Sequence {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Write a settled value produced by the request issued at `sequence`.
    pub fn record(
        &self,
        key: RequestKey,
        value: V,
        sequence: Sequence,
        policy: WritePolicy,
    ) -> WriteOutcome {
        let mut entries = rw_write(&self.entries, SOURCE, "record");

        let outcome = match entries.entry(key.clone()) {
            Entry::Occupied(existing)
                if policy == WritePolicy::NewestIssued && sequence < existing.get().sequence =>
            {
                WriteOutcome::Superseded
            }
            Entry::Occupied(mut existing) => {
                existing.insert(CachedValue { value, sequence });
                WriteOutcome::Replaced
            }
            Entry::Vacant(slot) => {
                slot.insert(CachedValue { value, sequence });
                WriteOutcome::Inserted
            }
        };
        drop(entries);

        if outcome == WriteOutcome::Superseded {
            counter!(METRIC_CACHE_WRITE_SUPERSEDED).increment(1);
            debug!(
                key = %key,
                sequence,
                policy = %policy,
                result = "superseded",
                "Dropped cache write older than stored value"
            );
        } else {
            counter!(METRIC_CACHE_WRITE).increment(1);
        }
        outcome
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for CacheStore<V> {
    fn default() -> Self {
        Self::new()
    }
}
