//! Caches with bounded capacity and time-bounded entries.
//!
//! [ValidityCache] is the building block every store in the server is made
//! of: a map from keys to values tagged with a validity window, safe for
//! concurrent use, with LRU eviction once the configured capacity is
//! reached. Entries whose window has passed are never returned and are
//! removed on discovery; a periodic sweep driven by the verifier's reaper
//! clears the rest.
//!
//! The specialized stores live in the submodules: [keys] holds public
//! keys, [pending] holds sections waiting for a delegation.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::error;
use std::fmt;
use std::hash::Hash;
use tracing::warn;

use crate::base::unix_now;

pub mod keys;
pub mod pending;

//------------ ValidityCache -------------------------------------------------

/// A bounded, concurrently usable map of time-limited entries.
///
/// Capacity is fixed at construction. Inserting past capacity evicts the
/// least recently used entry; entries added through [add_pinned] are never
/// evicted. A cache may be given a warn size, a high-water mark whose
/// crossing is signalled once without affecting the eviction policy.
///
/// [add_pinned]: Self::add_pinned
#[derive(Debug)]
pub struct ValidityCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: usize,
    warn_size: Option<usize>,
}

#[derive(Debug)]
struct Inner<K, V> {
    map: HashMap<K, Entry<V>>,
    tick: u64,
    warned: bool,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    valid_until: i64,
    last_used: u64,
    pinned: bool,
}

impl<K: Eq + Hash + Clone, V> ValidityCache<K, V> {
    /// Creates a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        Self::build(capacity, None)
    }

    /// Creates a cache that signals when fill crosses `warn_size`.
    pub fn with_warn_size(
        capacity: usize,
        warn_size: usize,
    ) -> Result<Self, CacheError> {
        Self::build(capacity, Some(warn_size))
    }

    fn build(
        capacity: usize,
        warn_size: Option<usize>,
    ) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        Ok(ValidityCache {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                tick: 0,
                warned: false,
            }),
            capacity,
            warn_size,
        })
    }

    /// Inserts an entry valid until `valid_until`.
    ///
    /// Returns whether this is the first insertion for the key since it
    /// was last removed. An existing entry is replaced and its validity
    /// window reset.
    pub fn add(&self, key: K, value: V, valid_until: i64) -> bool {
        self.insert(key, value, valid_until, false)
    }

    /// Inserts an entry that is exempt from LRU eviction.
    ///
    /// Pinned entries still expire with their validity window.
    pub fn add_pinned(&self, key: K, value: V, valid_until: i64) -> bool {
        self.insert(key, value, valid_until, true)
    }

    fn insert(
        &self,
        key: K,
        value: V,
        valid_until: i64,
        pinned: bool,
    ) -> bool {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        let fresh = if inner.map.contains_key(&key) {
            if let Some(entry) = inner.map.get_mut(&key) {
                entry.value = value;
                entry.valid_until = valid_until;
                entry.last_used = tick;
                entry.pinned = entry.pinned || pinned;
            }
            false
        } else {
            if inner.map.len() >= self.capacity && !inner.evict_one() {
                warn!("cache full of pinned entries, dropping insertion");
                return false;
            }
            inner.map.insert(
                key,
                Entry {
                    value,
                    valid_until,
                    last_used: tick,
                    pinned,
                },
            );
            true
        };
        if let Some(warn_size) = self.warn_size {
            if inner.map.len() >= warn_size {
                if !inner.warned {
                    warn!(
                        len = inner.map.len(),
                        warn_size, "cache fill crossed high-water mark"
                    );
                    inner.warned = true;
                }
            } else {
                inner.warned = false;
            }
        }
        fresh
    }

    /// Looks up an entry, refreshing its LRU position.
    ///
    /// An entry whose validity window has passed is removed and not
    /// returned.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.visit(key, |value| value.clone())
    }

    /// Runs an operation on the value of a live entry in place.
    ///
    /// Like [get][Self::get] this refreshes the LRU position and removes
    /// an expired entry instead of exposing it.
    pub fn visit<R>(&self, key: &K, op: impl FnOnce(&mut V) -> R) -> Option<R> {
        let now = unix_now();
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        let expired = match inner.map.get(key) {
            None => return None,
            Some(entry) => entry.valid_until <= now,
        };
        if expired {
            inner.map.remove(key);
            return None;
        }
        if let Some(entry) = inner.map.get_mut(key) {
            entry.last_used = tick;
            Some(op(&mut entry.value))
        } else {
            None
        }
    }

    /// Widens the validity window of an entry.
    pub fn extend_validity(&self, key: &K, valid_until: i64) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.map.get_mut(key) {
            if valid_until > entry.valid_until {
                entry.valid_until = valid_until;
            }
        }
    }

    /// Removes an entry, returning its value.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().map.remove(key).map(|entry| entry.value)
    }

    /// Sweeps out every entry whose validity window has passed.
    ///
    /// Returns the number of removed entries. The sweep frequency is
    /// driven by the verifier's reaper.
    pub fn remove_expired(&self) -> usize {
        let now = unix_now();
        let mut inner = self.inner.lock();
        let before = inner.map.len();
        inner.map.retain(|_, entry| entry.valid_until > now);
        before - inner.map.len()
    }

    /// Keeps only the entries the predicate approves of.
    ///
    /// The predicate may mutate values; it does not affect LRU order.
    pub fn retain(&self, mut keep: impl FnMut(&K, &mut V) -> bool) {
        let mut inner = self.inner.lock();
        inner.map.retain(|key, entry| keep(key, &mut entry.value));
    }

    /// The number of live entries.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Returns whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fixed capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    /// Evicts the least recently used unpinned entry.
    fn evict_one(&mut self) -> bool {
        let victim = self
            .map
            .iter()
            .filter(|(_, entry)| !entry.pinned)
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        match victim {
            Some(key) => {
                self.map.remove(&key);
                true
            }
            None => false,
        }
    }
}

//------------ CacheError ----------------------------------------------------

/// An error creating a cache.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CacheError {
    /// The configured capacity was zero.
    ZeroCapacity,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CacheError::ZeroCapacity => {
                write!(f, "cache capacity must not be zero")
            }
        }
    }
}

impl error::Error for CacheError {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    fn far() -> i64 {
        unix_now() + 3_600
    }

    #[test]
    fn zero_capacity_is_refused() {
        assert!(ValidityCache::<u32, u32>::new(0).is_err());
    }

    #[test]
    fn add_reports_first_insertion() {
        let cache = ValidityCache::new(4).unwrap();
        assert!(cache.add(1, "a", far()));
        assert!(!cache.add(1, "b", far()));
        cache.remove(&1);
        assert!(cache.add(1, "c", far()));
    }

    #[test]
    fn get_returns_live_entries_only() {
        let cache = ValidityCache::new(4).unwrap();
        cache.add(1, "live", far());
        cache.add(2, "dead", unix_now() - 1);
        // A window ending exactly now counts as expired.
        cache.add(3, "edge", unix_now());

        assert_eq!(cache.get(&1), Some("live"));
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&3), None);
        // Expired entries are removed on discovery.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_is_least_recently_used() {
        let cache = ValidityCache::new(2).unwrap();
        cache.add(1, "one", far());
        cache.add(2, "two", far());
        // Touch 1 so that 2 is the eviction victim.
        cache.get(&1);
        cache.add(3, "three", far());

        assert_eq!(cache.get(&1), Some("one"));
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&3), Some("three"));
    }

    #[test]
    fn pinned_entries_survive_eviction() {
        let cache = ValidityCache::new(2).unwrap();
        cache.add_pinned(1, "anchor", far());
        cache.add(2, "two", far());
        cache.add(3, "three", far());
        cache.add(4, "four", far());

        assert_eq!(cache.get(&1), Some("anchor"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let cache = ValidityCache::new(8).unwrap();
        cache.add(1, "a", far());
        cache.add(2, "b", unix_now() - 10);
        cache.add(3, "c", unix_now() - 20);
        assert_eq!(cache.remove_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn visit_mutates_in_place() {
        let cache = ValidityCache::new(4).unwrap();
        cache.add(1, vec![1], far());
        cache.visit(&1, |v| v.push(2));
        assert_eq!(cache.get(&1), Some(vec![1, 2]));
    }

    #[test]
    fn warn_size_does_not_change_eviction() {
        let cache = ValidityCache::with_warn_size(4, 2).unwrap();
        cache.add(1, "a", far());
        cache.add(2, "b", far());
        cache.add(3, "c", far());
        assert_eq!(cache.len(), 3);
    }
}
