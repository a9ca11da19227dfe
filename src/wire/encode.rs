//! Encoding messages and sections into CBOR.

use super::{Message, WireError, MESSAGE_TAG_BYTES};
use crate::base::keys::{PublicKey, Signature};
use crate::base::object::Object;
use crate::base::section::{
    Assertion, Notification, Query, Section, Shard, Signed, Zone,
    ZoneContent,
};
use serde_cbor::Value;
use std::collections::BTreeMap;

//------------ Field keys ----------------------------------------------------
//
// Integer keys of the message map and the section body maps. The message
// keys are fixed by the protocol; the section keys follow the RAINS field
// tables.

pub(super) const MK_SIGNATURES: i128 = 0;
pub(super) const MK_CAPABILITIES: i128 = 1;
pub(super) const MK_TOKEN: i128 = 2;
pub(super) const MK_CONTENT: i128 = 23;

pub(super) const SK_SIGNATURES: i128 = 0;
pub(super) const SK_TOKEN: i128 = 2;
pub(super) const SK_SUBJECT_NAME: i128 = 3;
pub(super) const SK_SUBJECT_ZONE: i128 = 4;
pub(super) const SK_QUERY_NAME: i128 = 5;
pub(super) const SK_CONTEXT: i128 = 6;
pub(super) const SK_OBJECTS: i128 = 7;
pub(super) const SK_QUERY_TYPES: i128 = 10;
pub(super) const SK_RANGE_FROM: i128 = 11;
pub(super) const SK_RANGE_TO: i128 = 12;
pub(super) const SK_OPTIONS: i128 = 13;
pub(super) const SK_EXPIRES: i128 = 14;
pub(super) const SK_NOTE_TYPE: i128 = 21;
pub(super) const SK_NOTE_DATA: i128 = 22;
pub(super) const SK_CONTENT: i128 = 23;

pub(super) const TYPE_ASSERTION: i128 = 1;
pub(super) const TYPE_SHARD: i128 = 2;
pub(super) const TYPE_ZONE: i128 = 3;
pub(super) const TYPE_QUERY: i128 = 4;
pub(super) const TYPE_NOTIFICATION: i128 = 23;

fn int(value: i128) -> Value {
    Value::Integer(value)
}

fn text(value: &str) -> Value {
    Value::Text(value.into())
}

//------------ Message encoding ----------------------------------------------

/// Encodes a message into its tagged CBOR representation.
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, WireError> {
    let map = message_map(msg, true)?;
    let mut out = MESSAGE_TAG_BYTES.to_vec();
    out.extend(serde_cbor::to_vec(&Value::Map(map))?);
    Ok(out)
}

/// Returns the canonical byte string a message signature covers.
///
/// The message content is sorted into the canonical order and the
/// signature field is omitted.
pub fn message_sig_bytes(msg: &Message) -> Result<Vec<u8>, WireError> {
    let mut copy = msg.clone();
    copy.sort();
    let map = message_map(&copy, false)?;
    Ok(serde_cbor::to_vec(&Value::Map(map))?)
}

fn message_map(
    msg: &Message,
    include_sigs: bool,
) -> Result<BTreeMap<Value, Value>, WireError> {
    let mut map = BTreeMap::new();
    if include_sigs && !msg.signatures.is_empty() {
        map.insert(int(MK_SIGNATURES), signatures_value(&msg.signatures));
    }
    if !msg.capabilities.is_empty() {
        map.insert(
            int(MK_CAPABILITIES),
            Value::Array(
                msg.capabilities.iter().map(|c| text(c)).collect(),
            ),
        );
    }
    map.insert(
        int(MK_TOKEN),
        Value::Bytes(msg.token.as_bytes().to_vec()),
    );
    let content = msg
        .content
        .iter()
        .map(section_value)
        .collect::<Result<Vec<_>, _>>()?;
    map.insert(int(MK_CONTENT), Value::Array(content));
    Ok(map)
}

fn section_value(section: &Section) -> Result<Value, WireError> {
    let (code, body) = match section {
        Section::Assertion(a) => {
            (TYPE_ASSERTION, assertion_body(a, true))
        }
        Section::Shard(s) => (TYPE_SHARD, shard_body(s, true)),
        Section::Zone(z) => (TYPE_ZONE, zone_body(z, true)),
        Section::Query(q) => (TYPE_QUERY, query_body(q)),
        Section::Notification(n) => {
            (TYPE_NOTIFICATION, notification_body(n))
        }
        // The wire format defines no type codes for the address family;
        // address sections stay within the server.
        other => {
            return Err(WireError::UnsupportedSection(other.type_name()))
        }
    };
    Ok(Value::Array(vec![int(code), body]))
}

//------------ Section bodies ------------------------------------------------

/// Returns the canonical byte string a section signature covers.
///
/// All content is sorted into the canonical order and the outer section's
/// signatures are stripped; signatures of contained sections stay because
/// they are part of what the outer signature certifies.
pub fn signed_sig_bytes(section: &Signed) -> Result<Vec<u8>, WireError> {
    let mut copy = section.clone();
    copy.sort();
    let body = match &copy {
        Signed::Assertion(a) => assertion_body(a, false),
        Signed::Shard(s) => shard_body(s, false),
        Signed::Zone(z) => zone_body(z, false),
        Signed::AddressAssertion(a) => {
            let mut map = BTreeMap::new();
            map.insert(
                int(SK_SUBJECT_NAME),
                text(&a.subject_addr.to_string()),
            );
            map.insert(int(SK_CONTEXT), text(&a.context));
            map.insert(int(SK_OBJECTS), objects_value(&a.content));
            Value::Map(map)
        }
        Signed::AddressZone(z) => {
            let mut map = BTreeMap::new();
            map.insert(
                int(SK_SUBJECT_NAME),
                text(&z.subject_addr.to_string()),
            );
            map.insert(int(SK_CONTEXT), text(&z.context));
            map.insert(
                int(SK_CONTENT),
                Value::Array(
                    z.content
                        .iter()
                        .map(|a| {
                            let mut map = BTreeMap::new();
                            map.insert(
                                int(SK_SUBJECT_NAME),
                                text(&a.subject_addr.to_string()),
                            );
                            map.insert(int(SK_CONTEXT), text(&a.context));
                            map.insert(
                                int(SK_OBJECTS),
                                objects_value(&a.content),
                            );
                            if !a.signatures.is_empty() {
                                map.insert(
                                    int(SK_SIGNATURES),
                                    signatures_value(&a.signatures),
                                );
                            }
                            Value::Map(map)
                        })
                        .collect(),
                ),
            );
            Value::Map(map)
        }
    };
    Ok(serde_cbor::to_vec(&body)?)
}

pub(super) fn assertion_body(a: &Assertion, include_sigs: bool) -> Value {
    let mut map = BTreeMap::new();
    if include_sigs && !a.signatures.is_empty() {
        map.insert(int(SK_SIGNATURES), signatures_value(&a.signatures));
    }
    map.insert(int(SK_SUBJECT_NAME), text(&a.subject_name));
    map.insert(int(SK_SUBJECT_ZONE), text(&a.subject_zone));
    map.insert(int(SK_CONTEXT), text(&a.context));
    map.insert(int(SK_OBJECTS), objects_value(&a.content));
    Value::Map(map)
}

pub(super) fn shard_body(s: &Shard, include_sigs: bool) -> Value {
    let mut map = BTreeMap::new();
    if include_sigs && !s.signatures.is_empty() {
        map.insert(int(SK_SIGNATURES), signatures_value(&s.signatures));
    }
    map.insert(int(SK_SUBJECT_ZONE), text(&s.subject_zone));
    map.insert(int(SK_CONTEXT), text(&s.context));
    map.insert(int(SK_RANGE_FROM), text(&s.range_from));
    map.insert(int(SK_RANGE_TO), text(&s.range_to));
    map.insert(
        int(SK_CONTENT),
        Value::Array(
            s.content.iter().map(|a| assertion_body(a, true)).collect(),
        ),
    );
    Value::Map(map)
}

pub(super) fn zone_body(z: &Zone, include_sigs: bool) -> Value {
    let mut map = BTreeMap::new();
    if include_sigs && !z.signatures.is_empty() {
        map.insert(int(SK_SIGNATURES), signatures_value(&z.signatures));
    }
    map.insert(int(SK_SUBJECT_ZONE), text(&z.subject_zone));
    map.insert(int(SK_CONTEXT), text(&z.context));
    map.insert(
        int(SK_CONTENT),
        Value::Array(
            z.content
                .iter()
                .map(|element| match element {
                    ZoneContent::Assertion(a) => Value::Array(vec![
                        int(TYPE_ASSERTION),
                        assertion_body(a, true),
                    ]),
                    ZoneContent::Shard(s) => Value::Array(vec![
                        int(TYPE_SHARD),
                        shard_body(s, true),
                    ]),
                })
                .collect(),
        ),
    );
    Value::Map(map)
}

pub(super) fn query_body(q: &Query) -> Value {
    let mut map = BTreeMap::new();
    map.insert(int(SK_TOKEN), Value::Bytes(q.token.as_bytes().to_vec()));
    map.insert(int(SK_QUERY_NAME), text(&q.name));
    map.insert(int(SK_CONTEXT), text(&q.context));
    map.insert(
        int(SK_QUERY_TYPES),
        Value::Array(
            q.types.iter().map(|t| int(t.to_int() as i128)).collect(),
        ),
    );
    map.insert(int(SK_EXPIRES), int(q.expires as i128));
    if !q.options.is_empty() {
        map.insert(
            int(SK_OPTIONS),
            Value::Array(
                q.options.iter().map(|o| int(o.to_int() as i128)).collect(),
            ),
        );
    }
    Value::Map(map)
}

pub(super) fn notification_body(n: &Notification) -> Value {
    let mut map = BTreeMap::new();
    map.insert(int(SK_TOKEN), Value::Bytes(n.token.as_bytes().to_vec()));
    map.insert(int(SK_NOTE_TYPE), int(n.kind.to_int() as i128));
    if !n.data.is_empty() {
        map.insert(int(SK_NOTE_DATA), text(&n.data));
    }
    Value::Map(map)
}

//------------ Objects and signatures ----------------------------------------

fn objects_value(objects: &[Object]) -> Value {
    Value::Array(objects.iter().map(object_value).collect())
}

fn object_value(object: &Object) -> Value {
    let code = int(object.kind().to_int() as i128);
    let mut fields = vec![code];
    match object {
        Object::Name(alias) => {
            fields.push(text(&alias.name));
            fields.push(Value::Array(
                alias
                    .types
                    .iter()
                    .map(|t| int(t.to_int() as i128))
                    .collect(),
            ));
        }
        Object::Ip6(addr) => {
            fields.push(Value::Bytes(addr.octets().to_vec()));
        }
        Object::Ip4(addr) => {
            fields.push(Value::Bytes(addr.octets().to_vec()));
        }
        Object::Redirection(name) => fields.push(text(name)),
        Object::Delegation(pk)
        | Object::InfraKey(pk)
        | Object::ExternalKey(pk)
        | Object::NextKey(pk) => fields.extend(key_fields(pk)),
        Object::Nameset(expr) => fields.push(text(expr)),
        Object::Certificate(cert) => {
            fields.push(int(cert.protocol as i128));
            fields.push(int(cert.usage as i128));
            fields.push(int(cert.hash_algorithm as i128));
            fields.push(Value::Bytes(cert.data.to_vec()));
        }
        Object::ServiceInfo(srv) => {
            fields.push(text(&srv.name));
            fields.push(int(srv.port as i128));
            fields.push(int(srv.priority as i128));
        }
        Object::Registrar(value) => fields.push(text(value)),
        Object::Registrant(value) => fields.push(text(value)),
    }
    Value::Array(fields)
}

fn key_fields(pk: &PublicKey) -> Vec<Value> {
    vec![
        int(pk.id.algorithm.to_int() as i128),
        int(pk.id.key_space.to_int() as i128),
        int(pk.id.key_phase as i128),
        int(pk.valid_since as i128),
        int(pk.valid_until as i128),
        Value::Bytes(pk.key.to_vec()),
    ]
}

fn signatures_value(signatures: &[Signature]) -> Value {
    Value::Array(
        signatures
            .iter()
            .map(|sig| {
                Value::Array(vec![
                    int(sig.id.algorithm.to_int() as i128),
                    int(sig.id.key_space.to_int() as i128),
                    int(sig.id.key_phase as i128),
                    int(sig.valid_since as i128),
                    int(sig.valid_until as i128),
                    Value::Bytes(sig.data.to_vec()),
                ])
            })
            .collect(),
    )
}
