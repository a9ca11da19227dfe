//! Signatures and public keys.

use super::codes::{KeySpace, SigAlg};
use bytes::Bytes;
use std::fmt;

//------------ PublicKeyId ---------------------------------------------------

/// The metadata shared between a signature and the key that made it.
///
/// A signature can only ever verify under a public key whose id matches
/// the signature's id exactly.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PublicKeyId {
    /// The signature algorithm.
    pub algorithm: SigAlg,

    /// The key space the key lives in.
    pub key_space: KeySpace,

    /// The phase of the key within its rollover cycle.
    pub key_phase: u64,
}

impl fmt::Display for PublicKeyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} phase {}",
            self.algorithm, self.key_space, self.key_phase
        )
    }
}

//------------ Signature -----------------------------------------------------

/// A signature over the canonical encoding of a section or message.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Signature {
    /// Identifies the public key this signature verifies under.
    pub id: PublicKeyId,

    /// The signature is not valid before this time.
    pub valid_since: i64,

    /// The signature is not valid at or after this time.
    pub valid_until: i64,

    /// The raw signature data.
    pub data: Bytes,
}

impl Signature {
    /// Returns whether the signature has expired at `now`.
    ///
    /// A signature whose `valid_until` equals `now` counts as expired.
    pub fn expired(&self, now: i64) -> bool {
        self.valid_until <= now
    }
}

//------------ PublicKey -----------------------------------------------------

/// A public key together with the (context, zone) that owns it.
///
/// For a key received through a delegation, context and zone are filled in
/// from the assertion the delegation arrived in. For the trust anchor they
/// name the root.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct PublicKey {
    /// Identifies algorithm, key space, and phase.
    pub id: PublicKeyId,

    /// The key is not valid before this time.
    pub valid_since: i64,

    /// The key is not valid at or after this time.
    pub valid_until: i64,

    /// The context the owning zone lives in.
    pub context: String,

    /// The zone this key speaks for.
    pub zone: String,

    /// The raw key material.
    pub key: Bytes,
}

impl PublicKey {
    /// Returns whether the key is currently valid at `now`.
    pub fn valid_at(&self, now: i64) -> bool {
        self.valid_since <= now && now < self.valid_until
    }

    /// Returns the cache identifier this key is stored under.
    pub fn key_id(&self) -> KeyId {
        KeyId {
            context: self.context.clone(),
            zone: self.zone.clone(),
            algorithm: self.id.algorithm,
        }
    }
}

//------------ KeyId ---------------------------------------------------------

/// The triple a public key is cached under.
///
/// This identifier is the contract between the verifier and the key
/// stores: the verifier computes the set of `KeyId`s a section needs and
/// the stores answer for exactly these triples.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct KeyId {
    /// The context of the owning zone.
    pub context: String,

    /// The zone the key speaks for.
    pub zone: String,

    /// The signature algorithm of the key.
    pub algorithm: SigAlg,
}

impl KeyId {
    /// Creates a key id from its parts.
    pub fn new(
        context: impl Into<String>,
        zone: impl Into<String>,
        algorithm: SigAlg,
    ) -> Self {
        KeyId {
            context: context.into(),
            zone: zone.into(),
            algorithm,
        }
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({} {} {})", self.context, self.zone, self.algorithm)
    }
}
