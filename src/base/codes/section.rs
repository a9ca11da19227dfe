//! Section type codes.

//------------ SectionType ---------------------------------------------------

int_enum! {
    /// Section type codes.
    ///
    /// On the wire every element of a message's section list is a two
    /// element array of one of these codes and the section body.
    =>
    SectionType, u8;

    /// An assertion.
    (Assertion => 1, b"assertion")

    /// A shard.
    (Shard => 2, b"shard")

    /// A zone.
    (Zone => 3, b"zone")

    /// A query.
    (Query => 4, b"query")

    /// A notification.
    (Notification => 23, b"notification")
}

int_enum_str_with_decimal!(SectionType, u8, "unknown section type");
