//! Decoding CBOR into messages and sections.

use super::encode::{
    MK_CAPABILITIES, MK_CONTENT, MK_SIGNATURES, MK_TOKEN, SK_CONTENT,
    SK_CONTEXT, SK_EXPIRES, SK_NOTE_DATA, SK_NOTE_TYPE, SK_OBJECTS,
    SK_OPTIONS, SK_QUERY_NAME, SK_QUERY_TYPES, SK_RANGE_FROM, SK_RANGE_TO,
    SK_SIGNATURES, SK_SUBJECT_NAME, SK_SUBJECT_ZONE, SK_TOKEN,
    TYPE_ASSERTION, TYPE_NOTIFICATION, TYPE_QUERY, TYPE_SHARD, TYPE_ZONE,
};
use super::{Message, WireError, MESSAGE_TAG_BYTES};
use crate::base::codes::{
    KeySpace, NotificationType, ObjectType, QueryOpt, SigAlg,
};
use crate::base::keys::{PublicKey, PublicKeyId, Signature};
use crate::base::object::{Certificate, NameAlias, Object, ServiceInfo};
use crate::base::section::{
    Assertion, Notification, Query, Section, Shard, Zone, ZoneContent,
};
use crate::base::token::Token;
use bytes::Bytes;
use serde_cbor::Value;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

//------------ Message decoding ----------------------------------------------

/// Decodes a tagged CBOR message.
pub fn decode_message(data: &[u8]) -> Result<Message, WireError> {
    let rest = data
        .strip_prefix(&MESSAGE_TAG_BYTES[..])
        .ok_or(WireError::BadTag)?;
    let value: Value = serde_cbor::from_slice(rest)?;
    let mut map = as_map(value, "message")?;

    let signatures = match take(&mut map, MK_SIGNATURES) {
        Some(value) => decode_signatures(value)?,
        None => Vec::new(),
    };
    let capabilities = match take(&mut map, MK_CAPABILITIES) {
        Some(value) => as_array(value, "capabilities")?
            .into_iter()
            .map(|v| as_text(v, "capability"))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    let token = decode_token(
        take(&mut map, MK_TOKEN).ok_or(WireError::MissingField("token"))?,
    )?;
    let content = match take(&mut map, MK_CONTENT) {
        Some(value) => as_array(value, "content")?
            .into_iter()
            .map(decode_section)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(Message {
        capabilities,
        token,
        content,
        signatures,
    })
}

fn decode_section(value: Value) -> Result<Section, WireError> {
    let mut pair = as_array(value, "section")?.into_iter();
    let code = as_int(
        pair.next().ok_or(WireError::UnexpectedValue("section"))?,
        "section type",
    )?;
    let body = pair.next().ok_or(WireError::UnexpectedValue("section"))?;
    match code {
        TYPE_ASSERTION => Ok(Section::Assertion(decode_assertion(body)?)),
        TYPE_SHARD => Ok(Section::Shard(decode_shard(body)?)),
        TYPE_ZONE => Ok(Section::Zone(decode_zone(body)?)),
        TYPE_QUERY => Ok(Section::Query(decode_query(body)?)),
        TYPE_NOTIFICATION => {
            Ok(Section::Notification(decode_notification(body)?))
        }
        _ => Err(WireError::UnsupportedSection("unknown type code")),
    }
}

//------------ Section bodies ------------------------------------------------

fn decode_assertion(value: Value) -> Result<Assertion, WireError> {
    let mut map = as_map(value, "assertion")?;
    let signatures = match take(&mut map, SK_SIGNATURES) {
        Some(value) => decode_signatures(value)?,
        None => Vec::new(),
    };
    let mut assertion = Assertion::new(
        required_text(&mut map, SK_SUBJECT_NAME, "subject-name")?,
        required_text(&mut map, SK_SUBJECT_ZONE, "subject-zone")?,
        required_text(&mut map, SK_CONTEXT, "context")?,
    );
    assertion.content = match take(&mut map, SK_OBJECTS) {
        Some(value) => as_array(value, "objects")?
            .into_iter()
            .map(decode_object)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    assertion.signatures = signatures;
    Ok(assertion)
}

fn decode_shard(value: Value) -> Result<Shard, WireError> {
    let mut map = as_map(value, "shard")?;
    let signatures = match take(&mut map, SK_SIGNATURES) {
        Some(value) => decode_signatures(value)?,
        None => Vec::new(),
    };
    let mut shard = Shard::new(
        required_text(&mut map, SK_SUBJECT_ZONE, "subject-zone")?,
        required_text(&mut map, SK_CONTEXT, "context")?,
        required_text(&mut map, SK_RANGE_FROM, "range-from")?,
        required_text(&mut map, SK_RANGE_TO, "range-to")?,
    );
    shard.content = match take(&mut map, SK_CONTENT) {
        Some(value) => as_array(value, "shard content")?
            .into_iter()
            .map(decode_assertion)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    shard.signatures = signatures;
    Ok(shard)
}

fn decode_zone(value: Value) -> Result<Zone, WireError> {
    let mut map = as_map(value, "zone")?;
    let signatures = match take(&mut map, SK_SIGNATURES) {
        Some(value) => decode_signatures(value)?,
        None => Vec::new(),
    };
    let mut zone = Zone::new(
        required_text(&mut map, SK_SUBJECT_ZONE, "subject-zone")?,
        required_text(&mut map, SK_CONTEXT, "context")?,
    );
    zone.content = match take(&mut map, SK_CONTENT) {
        Some(value) => as_array(value, "zone content")?
            .into_iter()
            .map(|element| {
                let mut pair = as_array(element, "zone element")?
                    .into_iter();
                let code = as_int(
                    pair.next()
                        .ok_or(WireError::UnexpectedValue("zone element"))?,
                    "zone element type",
                )?;
                let body = pair
                    .next()
                    .ok_or(WireError::UnexpectedValue("zone element"))?;
                match code {
                    TYPE_ASSERTION => {
                        Ok(ZoneContent::Assertion(decode_assertion(body)?))
                    }
                    TYPE_SHARD => {
                        Ok(ZoneContent::Shard(decode_shard(body)?))
                    }
                    _ => Err(WireError::UnexpectedValue(
                        "zone element type",
                    )),
                }
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    zone.signatures = signatures;
    Ok(zone)
}

fn decode_query(value: Value) -> Result<Query, WireError> {
    let mut map = as_map(value, "query")?;
    let token = decode_token(
        take(&mut map, SK_TOKEN)
            .ok_or(WireError::MissingField("query token"))?,
    )?;
    let mut query = Query::new(
        required_text(&mut map, SK_QUERY_NAME, "query-name")?,
        required_text(&mut map, SK_CONTEXT, "context")?,
        Vec::new(),
        as_i64(
            take(&mut map, SK_EXPIRES)
                .ok_or(WireError::MissingField("expires"))?,
            "expires",
        )?,
    );
    query.token = token;
    query.types = match take(&mut map, SK_QUERY_TYPES) {
        Some(value) => as_array(value, "query types")?
            .into_iter()
            .map(|v| {
                as_u8(v, "query type").map(ObjectType::from_int)
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    query.options = match take(&mut map, SK_OPTIONS) {
        Some(value) => as_array(value, "query options")?
            .into_iter()
            .map(|v| as_u8(v, "query option").map(QueryOpt::from_int))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    Ok(query)
}

fn decode_notification(value: Value) -> Result<Notification, WireError> {
    let mut map = as_map(value, "notification")?;
    let token = decode_token(
        take(&mut map, SK_TOKEN)
            .ok_or(WireError::MissingField("notification token"))?,
    )?;
    let kind = NotificationType::from_int(as_u16(
        take(&mut map, SK_NOTE_TYPE)
            .ok_or(WireError::MissingField("notification type"))?,
        "notification type",
    )?);
    let data = match take(&mut map, SK_NOTE_DATA) {
        Some(value) => as_text(value, "notification data")?,
        None => String::new(),
    };
    Ok(Notification { token, kind, data })
}

//------------ Objects and signatures ----------------------------------------

fn decode_object(value: Value) -> Result<Object, WireError> {
    let mut fields = as_array(value, "object")?.into_iter();
    let code = ObjectType::from_int(as_u8(
        fields.next().ok_or(WireError::UnexpectedValue("object"))?,
        "object type",
    )?);
    match code {
        ObjectType::Name => {
            let name = as_text(next_field(&mut fields, "name alias")?, "name alias")?;
            let types = as_array(next_field(&mut fields, "alias types")?, "alias types")?
                .into_iter()
                .map(|v| as_u8(v, "alias type").map(ObjectType::from_int))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Object::Name(NameAlias { name, types }))
        }
        ObjectType::Ip6 => {
            let bytes = as_bytes(next_field(&mut fields, "ip6")?, "ip6")?;
            let octets: [u8; 16] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| WireError::UnexpectedValue("ip6"))?;
            Ok(Object::Ip6(Ipv6Addr::from(octets)))
        }
        ObjectType::Ip4 => {
            let bytes = as_bytes(next_field(&mut fields, "ip4")?, "ip4")?;
            let octets: [u8; 4] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| WireError::UnexpectedValue("ip4"))?;
            Ok(Object::Ip4(Ipv4Addr::from(octets)))
        }
        ObjectType::Redirection => Ok(Object::Redirection(as_text(
            next_field(&mut fields, "redirection")?,
            "redirection",
        )?)),
        ObjectType::Delegation => {
            Ok(Object::Delegation(decode_key(&mut fields)?))
        }
        ObjectType::Nameset => {
            Ok(Object::Nameset(as_text(next_field(&mut fields, "nameset")?, "nameset")?))
        }
        ObjectType::Certificate => {
            let protocol = as_u8(next_field(&mut fields, "certificate")?, "cert protocol")?;
            let usage = as_u8(next_field(&mut fields, "certificate")?, "cert usage")?;
            let hash_algorithm =
                as_u8(next_field(&mut fields, "certificate")?, "cert hash algorithm")?;
            let data = as_bytes(next_field(&mut fields, "certificate")?, "cert data")?;
            Ok(Object::Certificate(Certificate {
                protocol,
                usage,
                hash_algorithm,
                data: Bytes::from(data),
            }))
        }
        ObjectType::ServiceInfo => {
            let name = as_text(next_field(&mut fields, "service info")?, "srv name")?;
            let port = as_u16(next_field(&mut fields, "service info")?, "srv port")?;
            let priority = as_u32(next_field(&mut fields, "service info")?, "srv priority")?;
            Ok(Object::ServiceInfo(ServiceInfo {
                name,
                port,
                priority,
            }))
        }
        ObjectType::Registrar => {
            Ok(Object::Registrar(as_text(next_field(&mut fields, "registrar")?, "registrar")?))
        }
        ObjectType::Registrant => Ok(Object::Registrant(as_text(
            next_field(&mut fields, "registrant")?,
            "registrant",
        )?)),
        ObjectType::InfraKey => {
            Ok(Object::InfraKey(decode_key(&mut fields)?))
        }
        ObjectType::ExternalKey => {
            Ok(Object::ExternalKey(decode_key(&mut fields)?))
        }
        ObjectType::NextKey => {
            Ok(Object::NextKey(decode_key(&mut fields)?))
        }
        ObjectType::Int(_) => {
            Err(WireError::UnexpectedValue("object type"))
        }
    }
}

fn decode_key(
    fields: &mut std::vec::IntoIter<Value>,
) -> Result<PublicKey, WireError> {
    let algorithm = SigAlg::from_int(as_u8(next_field(fields, "key")?, "key algorithm")?);
    let key_space =
        KeySpace::from_int(as_u8(next_field(fields, "key")?, "key space")?);
    let key_phase = as_u64(next_field(fields, "key")?, "key phase")?;
    let valid_since = as_i64(next_field(fields, "key")?, "key valid-since")?;
    let valid_until = as_i64(next_field(fields, "key")?, "key valid-until")?;
    let key = as_bytes(next_field(fields, "key")?, "key material")?;
    Ok(PublicKey {
        id: PublicKeyId {
            algorithm,
            key_space,
            key_phase,
        },
        valid_since,
        valid_until,
        context: String::new(),
        zone: String::new(),
        key: Bytes::from(key),
    })
}

fn decode_signatures(value: Value) -> Result<Vec<Signature>, WireError> {
    as_array(value, "signatures")?
        .into_iter()
        .map(decode_signature)
        .collect()
}

fn decode_signature(value: Value) -> Result<Signature, WireError> {
    let mut fields = as_array(value, "signature")?.into_iter();
    let algorithm = SigAlg::from_int(as_u8(
        next_field(&mut fields, "signature")?,
        "sig algorithm",
    )?);
    let key_space = KeySpace::from_int(as_u8(
        next_field(&mut fields, "signature")?,
        "sig key space",
    )?);
    let key_phase =
        as_u64(next_field(&mut fields, "signature")?, "sig key phase")?;
    let valid_since =
        as_i64(next_field(&mut fields, "signature")?, "sig valid-since")?;
    let valid_until =
        as_i64(next_field(&mut fields, "signature")?, "sig valid-until")?;
    let data = as_bytes(next_field(&mut fields, "signature")?, "sig data")?;
    Ok(Signature {
        id: PublicKeyId {
            algorithm,
            key_space,
            key_phase,
        },
        valid_since,
        valid_until,
        data: Bytes::from(data),
    })
}

fn decode_token(value: Value) -> Result<Token, WireError> {
    let bytes = as_bytes(value, "token")?;
    Token::from_slice(&bytes).ok_or(WireError::UnexpectedValue("token"))
}

//------------ Value helpers -------------------------------------------------

fn next_field(
    fields: &mut std::vec::IntoIter<Value>,
    what: &'static str,
) -> Result<Value, WireError> {
    fields.next().ok_or(WireError::UnexpectedValue(what))
}

fn take(map: &mut BTreeMap<Value, Value>, key: i128) -> Option<Value> {
    map.remove(&Value::Integer(key))
}

fn required_text(
    map: &mut BTreeMap<Value, Value>,
    key: i128,
    field: &'static str,
) -> Result<String, WireError> {
    as_text(take(map, key).ok_or(WireError::MissingField(field))?, field)
}

fn as_map(
    value: Value,
    what: &'static str,
) -> Result<BTreeMap<Value, Value>, WireError> {
    match value {
        Value::Map(map) => Ok(map),
        _ => Err(WireError::UnexpectedValue(what)),
    }
}

fn as_array(
    value: Value,
    what: &'static str,
) -> Result<Vec<Value>, WireError> {
    match value {
        Value::Array(array) => Ok(array),
        _ => Err(WireError::UnexpectedValue(what)),
    }
}

fn as_text(value: Value, what: &'static str) -> Result<String, WireError> {
    match value {
        Value::Text(text) => Ok(text),
        _ => Err(WireError::UnexpectedValue(what)),
    }
}

fn as_bytes(value: Value, what: &'static str) -> Result<Vec<u8>, WireError> {
    match value {
        Value::Bytes(bytes) => Ok(bytes),
        _ => Err(WireError::UnexpectedValue(what)),
    }
}

fn as_int(value: Value, what: &'static str) -> Result<i128, WireError> {
    match value {
        Value::Integer(int) => Ok(int),
        _ => Err(WireError::UnexpectedValue(what)),
    }
}

fn as_u8(value: Value, what: &'static str) -> Result<u8, WireError> {
    as_int(value, what)?
        .try_into()
        .map_err(|_| WireError::UnexpectedValue(what))
}

fn as_u16(value: Value, what: &'static str) -> Result<u16, WireError> {
    as_int(value, what)?
        .try_into()
        .map_err(|_| WireError::UnexpectedValue(what))
}

fn as_u32(value: Value, what: &'static str) -> Result<u32, WireError> {
    as_int(value, what)?
        .try_into()
        .map_err(|_| WireError::UnexpectedValue(what))
}

fn as_u64(value: Value, what: &'static str) -> Result<u64, WireError> {
    as_int(value, what)?
        .try_into()
        .map_err(|_| WireError::UnexpectedValue(what))
}

fn as_i64(value: Value, what: &'static str) -> Result<i64, WireError> {
    as_int(value, what)?
        .try_into()
        .map_err(|_| WireError::UnexpectedValue(what))
}
