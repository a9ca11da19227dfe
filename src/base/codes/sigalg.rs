//! Signature algorithm codes.

//------------ SigAlg --------------------------------------------------------

int_enum! {
    /// Signature algorithm codes.
    ///
    /// The code selects both the signature scheme of a [`Signature`] and
    /// the interpretation of the key material of a [`PublicKey`]. Together
    /// with context and zone it forms the key identifier under which public
    /// keys are cached.
    ///
    /// [`Signature`]: crate::base::keys::Signature
    /// [`PublicKey`]: crate::base::keys::PublicKey
    =>
    SigAlg, u8;

    /// Ed25519 as described in RFC 8032.
    (Ed25519 => 1, b"ed25519")

    /// Ed448 as described in RFC 8032.
    (Ed448 => 2, b"ed448")

    /// ECDSA over curve P-256 with SHA-256.
    (EcdsaP256 => 3, b"ecdsa-256")

    /// ECDSA over curve P-384 with SHA-384.
    (EcdsaP384 => 4, b"ecdsa-384")
}

int_enum_str_with_decimal!(SigAlg, u8, "unknown signature algorithm");
