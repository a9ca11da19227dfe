//! Message tokens.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

//------------ Token ---------------------------------------------------------

/// A 16-byte opaque identifier matching a reply to its request.
///
/// Every message carries a token. A server answering a message copies the
/// token of the request into the reply, which is the only correlation
/// between the two. Tokens for outbound requests are drawn from a CSPRNG
/// via [`Token::new`] so that off-path attackers cannot guess them.
#[derive(
    Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize, Deserialize,
)]
pub struct Token([u8; 16]);

impl Token {
    /// Creates a fresh random token.
    pub fn new() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Token(bytes)
    }

    /// Creates a token from its raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Token(bytes)
    }

    /// Creates a token from a byte slice.
    ///
    /// Returns `None` if the slice is not exactly 16 bytes long.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 16] = slice.try_into().ok()?;
        Some(Token(bytes))
    }

    /// Returns a reference to the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

//--- Display and Debug

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Token({})", self)
    }
}

//============ Testing =======================================================
