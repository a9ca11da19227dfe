//! Notification type codes.

//------------ NotificationType ----------------------------------------------

int_enum! {
    /// Notification type codes.
    ///
    /// Notifications report conditions about a message identified by its
    /// token back to its sender. The numbering loosely follows HTTP status
    /// classes: 1xx informational, 3xx/4xx peer-attributable, 5xx server
    /// side.
    =>
    NotificationType, u16;

    /// A connection keep-alive; also echoes trace metadata.
    (Heartbeat => 100, b"heartbeat")

    /// A capability hash in the message was not understood.
    (CapHashNotKnown => 399, b"cap-hash-not-known")

    /// The message could not be decoded.
    (BadMessage => 400, b"bad-message")

    /// A received section was structurally inconsistent.
    (RcvInconsistentMsg => 403, b"inconsistent-message")

    /// The message exceeded the receiver's size limit.
    (MsgTooLarge => 413, b"message-too-large")

    /// The receiver shed the message due to load.
    (ServerOverloaded => 429, b"server-overloaded")

    /// An unspecified server error occurred.
    (UnspecifiedError => 500, b"unspecified-error")

    /// No assertion could be obtained for a query.
    (NoAssertionAvail => 504, b"no-assertion-available")
}

int_enum_str_with_decimal!(NotificationType, u16, "unknown notification type");
