//! Public key stores.
//!
//! Three stores of the same shape back the verifier: one for zone keys
//! learned through delegations, one for infrastructure keys of RAINS
//! servers, and one for keys from external key spaces. All are bounded
//! [ValidityCache] instances keyed by [KeyId]; a zone may hold several
//! keys (successive phases, overlapping rollovers) up to a configured
//! quota, beyond which the oldest-expiring key of that zone is dropped.
//!
//! The zone-key store is seeded at startup with the root zone's public
//! key from a trust anchor file and that key is pinned: it can expire but
//! never falls to eviction.

use super::{CacheError, ValidityCache};
use crate::base::codes::SigAlg;
use crate::base::keys::{KeyId, PublicKey, PublicKeyId};
use crate::base::unix_now;
use crate::config::Config;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::error;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

//------------ KeyStore ------------------------------------------------------

/// A bounded store of public keys.
#[derive(Debug)]
pub struct KeyStore {
    cache: ValidityCache<KeyId, Vec<PublicKey>>,
    zones: Mutex<HashMap<(String, String), HashSet<SigAlg>>>,
    pinned: Mutex<HashSet<KeyId>>,
    max_keys_per_zone: usize,
}

impl KeyStore {
    /// Creates a key store.
    ///
    /// `capacity` bounds the number of key identifiers held;
    /// `warn_size`, if given, signals when fill crosses it;
    /// `max_keys_per_zone` bounds the keys of a single (context, zone).
    pub fn new(
        capacity: usize,
        warn_size: Option<usize>,
        max_keys_per_zone: usize,
    ) -> Result<Self, CacheError> {
        let cache = match warn_size {
            Some(warn) => ValidityCache::with_warn_size(capacity, warn)?,
            None => ValidityCache::new(capacity)?,
        };
        Ok(KeyStore {
            cache,
            zones: Mutex::new(HashMap::new()),
            pinned: Mutex::new(HashSet::new()),
            max_keys_per_zone,
        })
    }

    /// Installs a key, returning whether it is new to the store.
    ///
    /// A key equal to one already present is a no-op reported as `false`.
    /// Installing past the per-zone quota drops the oldest-expiring key
    /// of that zone.
    pub fn install(&self, key: PublicKey) -> bool {
        let id = key.key_id();
        let zone = (key.context.clone(), key.zone.clone());
        let valid_until = key.valid_until;

        let appended = self.cache.visit(&id, |keys| {
            if keys.contains(&key) {
                false
            } else {
                keys.push(key.clone());
                true
            }
        });
        match appended {
            Some(false) => return false,
            Some(true) => self.cache.extend_validity(&id, valid_until),
            None => {
                self.cache.add(id.clone(), vec![key], valid_until);
            }
        }
        self.zones
            .lock()
            .entry(zone.clone())
            .or_default()
            .insert(id.algorithm);
        self.enforce_quota(&zone);
        true
    }

    /// Installs a key exempt from LRU and quota eviction.
    ///
    /// Used for the trust anchor. The key still expires with its own
    /// validity window.
    pub fn pin(&self, key: PublicKey) {
        let id = key.key_id();
        let zone = (key.context.clone(), key.zone.clone());
        let valid_until = key.valid_until;
        self.cache.add_pinned(id.clone(), vec![key], valid_until);
        self.zones.lock().entry(zone).or_default().insert(id.algorithm);
        self.pinned.lock().insert(id);
    }

    /// Returns a currently valid key for the identifier.
    pub fn get(&self, id: &KeyId) -> Option<PublicKey> {
        let now = unix_now();
        self.cache
            .visit(id, |keys| {
                keys.iter().find(|key| key.valid_at(now)).cloned()
            })
            .flatten()
    }

    /// Returns whether a currently valid key exists for the identifier.
    pub fn contains(&self, id: &KeyId) -> bool {
        self.get(id).is_some()
    }

    /// Sweeps out keys whose validity has passed.
    pub fn remove_expired(&self) {
        let now = unix_now();
        let mut emptied = Vec::new();
        self.cache.retain(|id, keys| {
            keys.retain(|key| key.valid_until > now);
            if keys.is_empty() {
                emptied.push(id.clone());
                false
            } else {
                true
            }
        });
        if !emptied.is_empty() {
            let mut zones = self.zones.lock();
            for id in emptied {
                let zone = (id.context.clone(), id.zone.clone());
                if let Some(algos) = zones.get_mut(&zone) {
                    algos.remove(&id.algorithm);
                    if algos.is_empty() {
                        zones.remove(&zone);
                    }
                }
            }
        }
    }

    /// The number of key identifiers held.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drops oldest-expiring keys of a zone until it is within quota.
    fn enforce_quota(&self, zone: &(String, String)) {
        loop {
            let algos: Vec<SigAlg> = match self.zones.lock().get(zone) {
                Some(algos) => algos.iter().copied().collect(),
                None => return,
            };
            let pinned = self.pinned.lock();
            let mut total = 0;
            let mut oldest: Option<(KeyId, i64)> = None;
            for algo in algos {
                let id = KeyId::new(
                    zone.0.clone(),
                    zone.1.clone(),
                    algo,
                );
                if pinned.contains(&id) {
                    continue;
                }
                self.cache.visit(&id, |keys| {
                    total += keys.len();
                    for key in keys.iter() {
                        let replace = match &oldest {
                            Some((_, until)) => key.valid_until < *until,
                            None => true,
                        };
                        if replace {
                            oldest =
                                Some((id.clone(), key.valid_until));
                        }
                    }
                });
            }
            drop(pinned);
            if total <= self.max_keys_per_zone {
                return;
            }
            let Some((victim_id, victim_until)) = oldest else {
                return;
            };
            debug!(
                id = %victim_id, "zone over key quota, dropping key"
            );
            let emptied = self.cache.visit(&victim_id, |keys| {
                if let Some(pos) = keys
                    .iter()
                    .position(|key| key.valid_until == victim_until)
                {
                    keys.remove(pos);
                }
                keys.is_empty()
            });
            if emptied.unwrap_or(false) {
                self.cache.remove(&victim_id);
                let mut zones = self.zones.lock();
                if let Some(algos) = zones.get_mut(zone) {
                    algos.remove(&victim_id.algorithm);
                }
            }
        }
    }
}

//------------ KeyStores -----------------------------------------------------

/// The three key stores of a server.
#[derive(Debug)]
pub struct KeyStores {
    /// Zone keys learned through delegations, rooted in the trust anchor.
    pub zone: KeyStore,

    /// Infrastructure keys of RAINS servers, for message signatures.
    pub infrastructure: KeyStore,

    /// Keys from external key spaces.
    pub external: KeyStore,
}

impl KeyStores {
    /// Creates the stores with the configured capacities.
    pub fn new(config: &Config) -> Result<Self, CacheError> {
        Ok(KeyStores {
            zone: KeyStore::new(
                config.zone_key_cache_size,
                Some(config.zone_key_cache_warn_size),
                config.max_public_keys_per_zone,
            )?,
            infrastructure: KeyStore::new(
                config.infrastructure_key_cache_size,
                None,
                config.max_public_keys_per_zone,
            )?,
            external: KeyStore::new(
                config.external_key_cache_size,
                None,
                config.max_public_keys_per_zone,
            )?,
        })
    }
}

//------------ Trust anchor --------------------------------------------------

/// The on-disk shape of the root zone key file.
#[derive(Debug, Deserialize)]
struct AnchorFile {
    algorithm: String,
    keyphase: u64,
    valid_since: i64,
    valid_until: i64,
    key: String,
}

/// Loads the root zone public key from a trust anchor file.
///
/// The file is JSON with the key material in hex. The returned key is
/// owned by the root zone in the global context and is meant to be
/// [pinned][KeyStore::pin] into the zone-key store.
pub fn load_root_anchor(path: &Path) -> Result<PublicKey, AnchorError> {
    let data = fs::read(path).map_err(AnchorError::Io)?;
    let anchor: AnchorFile =
        serde_json::from_slice(&data).map_err(AnchorError::Json)?;
    let algorithm: SigAlg = anchor
        .algorithm
        .parse()
        .map_err(|_| AnchorError::UnknownAlgorithm(anchor.algorithm))?;
    let key = hex::decode(&anchor.key)
        .map_err(|_| AnchorError::BadKeyMaterial)?;
    info!(path = %path.display(), "loaded root zone public key");
    Ok(PublicKey {
        id: PublicKeyId {
            algorithm,
            key_space: crate::base::codes::KeySpace::Rains,
            key_phase: anchor.keyphase,
        },
        valid_since: anchor.valid_since,
        valid_until: anchor.valid_until,
        context: ".".into(),
        zone: ".".into(),
        key: key.into(),
    })
}

//------------ AnchorError ---------------------------------------------------

/// An error loading the trust anchor.
#[derive(Debug)]
pub enum AnchorError {
    /// The file could not be read.
    Io(std::io::Error),

    /// The file is not valid JSON of the expected shape.
    Json(serde_json::Error),

    /// The algorithm name was not recognized.
    UnknownAlgorithm(String),

    /// The key material is not valid hex.
    BadKeyMaterial,
}

impl fmt::Display for AnchorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnchorError::Io(err) => {
                write!(f, "cannot read trust anchor: {}", err)
            }
            AnchorError::Json(err) => {
                write!(f, "malformed trust anchor: {}", err)
            }
            AnchorError::UnknownAlgorithm(name) => {
                write!(f, "unknown trust anchor algorithm '{}'", name)
            }
            AnchorError::BadKeyMaterial => {
                write!(f, "trust anchor key material is not valid hex")
            }
        }
    }
}

impl error::Error for AnchorError {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::codes::KeySpace;
    use bytes::Bytes;

    fn key(zone: &str, phase: u64, valid_until: i64) -> PublicKey {
        PublicKey {
            id: PublicKeyId {
                algorithm: SigAlg::Ed25519,
                key_space: KeySpace::Rains,
                key_phase: phase,
            },
            valid_since: 0,
            valid_until,
            context: ".".into(),
            zone: zone.into(),
            key: Bytes::from(vec![phase as u8; 32]),
        }
    }

    fn store() -> KeyStore {
        KeyStore::new(16, None, 3).unwrap()
    }

    fn far() -> i64 {
        unix_now() + 3_600
    }

    #[test]
    fn install_and_get() {
        let store = store();
        assert!(store.install(key("ch", 1, far())));
        let id = KeyId::new(".", "ch", SigAlg::Ed25519);
        assert_eq!(store.get(&id).unwrap().id.key_phase, 1);
    }

    #[test]
    fn duplicate_install_reports_false() {
        let store = store();
        assert!(store.install(key("ch", 1, far())));
        assert!(!store.install(key("ch", 1, far())));
    }

    #[test]
    fn get_skips_keys_outside_their_window() {
        let store = store();
        let mut not_yet = key("ch", 1, far());
        not_yet.valid_since = far() - 60;
        store.install(not_yet);
        let id = KeyId::new(".", "ch", SigAlg::Ed25519);
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn quota_drops_oldest_expiring_key() {
        let store = store();
        store.install(key("ch", 1, far() + 10));
        store.install(key("ch", 2, far() + 1));
        store.install(key("ch", 3, far() + 30));
        store.install(key("ch", 4, far() + 20));

        let id = KeyId::new(".", "ch", SigAlg::Ed25519);
        let phases: Vec<u64> = store
            .cache
            .get(&id)
            .unwrap()
            .iter()
            .map(|k| k.id.key_phase)
            .collect();
        assert_eq!(phases.len(), 3);
        assert!(!phases.contains(&2));
    }

    #[test]
    fn pinned_key_survives_quota_and_sweep() {
        let store = store();
        store.pin(key(".", 5, far()));
        for phase in 0..8 {
            store.install(key(".", phase, far() + phase as i64));
        }
        store.remove_expired();
        let id = KeyId::new(".", ".", SigAlg::Ed25519);
        assert!(store.get(&id).is_some());
    }

    #[test]
    fn sweep_removes_expired_keys() {
        let store = store();
        store.install(key("ch", 1, unix_now() - 1));
        store.install(key("ee", 1, far()));
        store.remove_expired();
        assert!(store.get(&KeyId::new(".", "ch", SigAlg::Ed25519)).is_none());
        assert!(store.get(&KeyId::new(".", "ee", SigAlg::Ed25519)).is_some());
    }

    #[test]
    fn anchor_round_trip() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!(
            "rains-anchor-test-{}.json",
            std::process::id()
        ));
        fs::write(
            &path,
            r#"{
                "algorithm": "ed25519",
                "keyphase": 5,
                "valid_since": 0,
                "valid_until": 4102444800,
                "key": "aabbccdd"
            }"#,
        )
        .unwrap();
        let anchor = load_root_anchor(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(anchor.id.algorithm, SigAlg::Ed25519);
        assert_eq!(anchor.id.key_phase, 5);
        assert_eq!(anchor.zone, ".");
        assert_eq!(anchor.key, Bytes::from(vec![0xaa, 0xbb, 0xcc, 0xdd]));
    }
}
