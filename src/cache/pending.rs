//! The pending-signature store.
//!
//! A section whose signatures reference a public key the server does not
//! have yet is parked here under the (context, zone) of the key it is
//! waiting for. When the delegation for that pair arrives, the whole
//! bucket is taken out and every parked section runs through verification
//! again. Sections whose own deadline passes first are swept out by the
//! reaper.

use crate::base::section::Signed;
use crate::base::token::Token;
use crate::base::unix_now;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::warn;

use super::CacheError;

//------------ PendingEntry --------------------------------------------------

/// A parked section together with where it came from.
#[derive(Clone, Debug)]
pub struct PendingEntry {
    /// The section awaiting a key.
    pub section: Signed,

    /// The peer the section arrived from.
    pub sender: SocketAddr,

    /// The token of the message the section arrived in.
    pub token: Token,

    /// Parking is pointless at or after this time.
    pub valid_until: i64,
}

//------------ PendingSignatures ---------------------------------------------

/// Sections waiting for a delegation, bucketed by (context, zone).
#[derive(Debug)]
pub struct PendingSignatures {
    inner: Mutex<Inner>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct Inner {
    buckets: HashMap<(String, String), Vec<PendingEntry>>,
    len: usize,
}

impl PendingSignatures {
    /// Creates a store holding at most `capacity` sections in total.
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        Ok(PendingSignatures {
            inner: Mutex::new(Inner::default()),
            capacity,
        })
    }

    /// Parks a section under the (context, zone) it waits for.
    ///
    /// Returns whether this is the first entry of that bucket, which is
    /// the caller's cue to emit a delegation query. When the store is
    /// full the section is dropped with a warning and `false` is
    /// returned so no query is emitted for work that cannot resume.
    pub fn add(
        &self,
        context: &str,
        zone: &str,
        entry: PendingEntry,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner.len >= self.capacity {
            warn!(
                context, zone,
                "pending-signature store full, dropping section"
            );
            return false;
        }
        inner.len += 1;
        let bucket = inner
            .buckets
            .entry((context.into(), zone.into()))
            .or_default();
        bucket.push(entry);
        bucket.len() == 1
    }

    /// Takes out every section parked under the (context, zone).
    ///
    /// Called when the delegation for the pair arrives; the caller
    /// re-verifies each returned section.
    pub fn get_and_remove_all(
        &self,
        context: &str,
        zone: &str,
    ) -> Vec<PendingEntry> {
        let mut inner = self.inner.lock();
        match inner
            .buckets
            .remove(&(context.to_string(), zone.to_string()))
        {
            Some(entries) => {
                inner.len -= entries.len();
                entries
            }
            None => Vec::new(),
        }
    }

    /// Sweeps out entries whose deadline has passed.
    pub fn remove_expired(&self) -> usize {
        let now = unix_now();
        let mut inner = self.inner.lock();
        let before = inner.len;
        inner.buckets.retain(|_, entries| {
            entries.retain(|entry| entry.valid_until > now);
            !entries.is_empty()
        });
        inner.len = inner.buckets.values().map(Vec::len).sum();
        before - inner.len
    }

    /// The number of parked sections.
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    /// Returns whether nothing is parked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::section::Assertion;

    fn entry(valid_until: i64) -> PendingEntry {
        PendingEntry {
            section: Signed::Assertion(Assertion::new("www", "ch", ".")),
            sender: "127.0.0.1:5022".parse().unwrap(),
            token: Token::new(),
            valid_until,
        }
    }

    fn far() -> i64 {
        unix_now() + 600
    }

    #[test]
    fn first_entry_per_bucket_is_signalled() {
        let store = PendingSignatures::new(8).unwrap();
        assert!(store.add(".", "ch", entry(far())));
        assert!(!store.add(".", "ch", entry(far())));
        assert!(store.add(".", "ee", entry(far())));
    }

    #[test]
    fn drain_empties_the_bucket() {
        let store = PendingSignatures::new(8).unwrap();
        store.add(".", "ch", entry(far()));
        store.add(".", "ch", entry(far()));
        store.add(".", "ee", entry(far()));

        let drained = store.get_and_remove_all(".", "ch");
        assert_eq!(drained.len(), 2);
        assert!(store.get_and_remove_all(".", "ch").is_empty());
        assert_eq!(store.len(), 1);

        // A later add to the drained bucket counts as first again.
        assert!(store.add(".", "ch", entry(far())));
    }

    #[test]
    fn full_store_drops_sections() {
        let store = PendingSignatures::new(2).unwrap();
        assert!(store.add(".", "ch", entry(far())));
        assert!(!store.add(".", "ch", entry(far())));
        assert!(!store.add(".", "ee", entry(far())));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let store = PendingSignatures::new(8).unwrap();
        store.add(".", "ch", entry(unix_now() - 1));
        store.add(".", "ch", entry(far()));
        store.add(".", "ee", entry(unix_now() - 5));

        assert_eq!(store.remove_expired(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_and_remove_all(".", "ch").len(), 1);
    }
}
