//! Basic types of the RAINS data model.
//!
//! This module provides the types every other part of the crate works
//! with: the protocol code enums in [codes], the 16-byte [Token], the
//! signature and public-key types in [keys], the typed object values in
//! [object], and the message sections in [section].
//!
//! Times in RAINS are absolute and are represented throughout as seconds
//! since the Unix epoch. [unix_now] returns the current time in that
//! representation.

pub mod codes;
pub mod keys;
pub mod object;
pub mod section;
pub mod token;

pub use self::keys::{KeyId, PublicKey, PublicKeyId, Signature};
pub use self::object::Object;
pub use self::section::{
    Assertion, Notification, Query, Section, Shard, Signed, Zone,
};
pub use self::token::Token;

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current time as seconds since the Unix epoch.
pub fn unix_now() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(_) => 0,
    }
}
