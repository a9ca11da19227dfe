//! Typed objects carried in assertions.

use super::codes::{ObjectType, SigAlg};
use super::keys::PublicKey;
use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

//------------ Object --------------------------------------------------------

/// A typed object bound to a subject by an assertion.
///
/// The variants are declared in the order of their type codes, so the
/// derived ordering is the canonical comparator used when sorting content
/// for signing.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Object {
    /// An alias to another name, valid for the listed object types.
    Name(NameAlias),

    /// An IPv6 address of the subject.
    Ip6(Ipv6Addr),

    /// An IPv4 address of the subject.
    Ip4(Ipv4Addr),

    /// The service name of another authoritative server for the subject.
    Redirection(String),

    /// A public key the issuing zone delegates to the subject.
    Delegation(PublicKey),

    /// An expression restricting the names that may exist below the
    /// subject. Kept opaque by this implementation.
    Nameset(String),

    /// A certificate the subject presents or pins.
    Certificate(Certificate),

    /// Service information resolving a service name to host and port.
    ServiceInfo(ServiceInfo),

    /// The registrar responsible for the subject.
    Registrar(String),

    /// The registrant of the subject.
    Registrant(String),

    /// The infrastructure key of a RAINS server run by the subject.
    InfraKey(PublicKey),

    /// A key in an external key space, e.g. for DNSSEC interoperation.
    ExternalKey(PublicKey),

    /// The key the subject will use after its next rollover.
    NextKey(PublicKey),
}

impl Object {
    /// Returns the type code of this object.
    pub fn kind(&self) -> ObjectType {
        match self {
            Object::Name(_) => ObjectType::Name,
            Object::Ip6(_) => ObjectType::Ip6,
            Object::Ip4(_) => ObjectType::Ip4,
            Object::Redirection(_) => ObjectType::Redirection,
            Object::Delegation(_) => ObjectType::Delegation,
            Object::Nameset(_) => ObjectType::Nameset,
            Object::Certificate(_) => ObjectType::Certificate,
            Object::ServiceInfo(_) => ObjectType::ServiceInfo,
            Object::Registrar(_) => ObjectType::Registrar,
            Object::Registrant(_) => ObjectType::Registrant,
            Object::InfraKey(_) => ObjectType::InfraKey,
            Object::ExternalKey(_) => ObjectType::ExternalKey,
            Object::NextKey(_) => ObjectType::NextKey,
        }
    }

    /// Returns the IP address if this is an address object.
    pub fn ip_addr(&self) -> Option<IpAddr> {
        match self {
            Object::Ip4(addr) => Some(IpAddr::V4(*addr)),
            Object::Ip6(addr) => Some(IpAddr::V6(*addr)),
            _ => None,
        }
    }
}

//------------ NameAlias -----------------------------------------------------

/// A name alias together with the object types it may stand in for.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct NameAlias {
    /// The fully qualified name the subject is an alias for.
    pub name: String,

    /// The object types the alias may be followed for.
    pub types: Vec<ObjectType>,
}

//------------ ServiceInfo ---------------------------------------------------

/// Service information: where a named service is actually provided.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct ServiceInfo {
    /// The host name providing the service.
    pub name: String,

    /// The transport port of the service.
    pub port: u16,

    /// Relative priority of this record, lower is preferred.
    pub priority: u32,
}

//------------ Certificate ---------------------------------------------------

/// A certificate object.
///
/// The fields mirror the wire representation; this implementation stores
/// and serves certificate objects but does not interpret them.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Certificate {
    /// The protocol family the certificate is for.
    pub protocol: u8,

    /// How the certificate is to be used.
    pub usage: u8,

    /// The hash algorithm if `data` is a digest.
    pub hash_algorithm: u8,

    /// Certificate or digest bytes.
    pub data: Bytes,
}

/// Shorthand for building a delegation object in tests and zone tooling.
pub fn delegation(
    algorithm: SigAlg,
    key_phase: u64,
    valid_since: i64,
    valid_until: i64,
    key: Bytes,
) -> Object {
    use super::codes::KeySpace;
    use super::keys::PublicKeyId;

    Object::Delegation(PublicKey {
        id: PublicKeyId {
            algorithm,
            key_space: KeySpace::Rains,
            key_phase,
        },
        valid_since,
        valid_until,
        context: String::new(),
        zone: String::new(),
        key,
    })
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn canonical_order_follows_type_codes() {
        let mut objects = vec![
            Object::Registrar("example".into()),
            Object::Ip4(Ipv4Addr::new(192, 0, 2, 1)),
            Object::Name(NameAlias {
                name: "other".into(),
                types: vec![ObjectType::Ip4],
            }),
        ];
        objects.sort();
        assert_eq!(objects[0].kind(), ObjectType::Name);
        assert_eq!(objects[1].kind(), ObjectType::Ip4);
        assert_eq!(objects[2].kind(), ObjectType::Registrar);
    }

    #[test]
    fn same_type_orders_by_value() {
        let a = Object::Ip4(Ipv4Addr::new(192, 0, 2, 1));
        let b = Object::Ip4(Ipv4Addr::new(192, 0, 2, 2));
        assert!(a < b);
    }
}
