//! Object type codes.

//------------ ObjectType ----------------------------------------------------

int_enum! {
    /// Object type codes.
    ///
    /// Each object in an assertion's content is tagged with one of these
    /// codes. Queries carry a list of them to say which object types they
    /// are interested in.
    =>
    ObjectType, u8;

    /// A name alias together with the object types valid for it.
    (Name => 1, b"name")

    /// An IPv6 address.
    (Ip6 => 2, b"ip6")

    /// An IPv4 address.
    (Ip4 => 3, b"ip4")

    /// A redirection to another authoritative server's service name.
    (Redirection => 4, b"redir")

    /// A public key delegated to the subject name.
    (Delegation => 5, b"deleg")

    /// An expression restricting the names within a zone.
    (Nameset => 6, b"nameset")

    /// A certificate or certificate reference.
    (Certificate => 7, b"cert")

    /// Service information: host name, port, and priority.
    (ServiceInfo => 8, b"srv")

    /// Registrar information.
    (Registrar => 9, b"regr")

    /// Registrant information.
    (Registrant => 10, b"regt")

    /// An infrastructure key of a RAINS server.
    (InfraKey => 11, b"infra")

    /// A key from an external key space.
    (ExternalKey => 12, b"extra")

    /// The next public key the subject will use, for pre-publication.
    (NextKey => 13, b"next")
}

int_enum_str_with_decimal!(ObjectType, u8, "unknown object type");
