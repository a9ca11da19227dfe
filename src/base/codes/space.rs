//! Key space identifiers.

//------------ KeySpace ------------------------------------------------------

int_enum! {
    /// Key space identifiers.
    ///
    /// A signature in a key space other than [`KeySpace::Rains`] is opaque
    /// to this implementation: the verifier preserves it but does not try
    /// to check it.
    =>
    KeySpace, u8;

    /// The native RAINS key space.
    (Rains => 0, b"rains")
}

int_enum_str_with_decimal!(KeySpace, u8, "unknown key space");
