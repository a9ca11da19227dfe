//! The wire format.
//!
//! RAINS messages travel as CBOR: a semantic tag followed by an
//! integer-keyed map with the signatures, capabilities, token, and section
//! list of the message. Each section in the list is a two element array of
//! a [SectionType] code and the section body, itself an integer-keyed map.
//!
//! Besides the message codec this module provides the canonical signing
//! encoding: the deterministic byte string a signature covers, obtained by
//! sorting all content into the canonical order and encoding the section
//! with its own signatures stripped.
//!
//! On a stream transport every message is preceded by a four byte
//! big-endian length so a reader can reject oversized messages before
//! decoding them.
//!
//! [SectionType]: crate::base::codes::SectionType

use crate::base::keys::Signature;
use crate::base::section::Section;
use crate::base::token::Token;
use std::cmp::Ordering;
use std::error;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub use self::decode::decode_message;
pub use self::encode::{encode_message, message_sig_bytes, signed_sig_bytes};

mod decode;
mod encode;

//------------ Capabilities --------------------------------------------------

/// The capability URN for TLS-over-TCP service.
pub const CAP_TLS_OVER_TCP: &str = "urn:x-rains:tlssrv";

/// The capability URN of a peer that does not listen for connections.
pub const CAP_NO_CAPABILITY: &str = "urn:x-rains:nocapability";

/// The CBOR tag marking a RAINS message.
pub const MESSAGE_TAG: u64 = 0x00E9_9BA8;

/// The serialized form of [MESSAGE_TAG]: major type 6 with a 4-byte value.
pub(crate) const MESSAGE_TAG_BYTES: [u8; 5] = [0xda, 0x00, 0xe9, 0x9b, 0xa8];

//------------ Message -------------------------------------------------------

/// A RAINS message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    /// Capabilities of the server originating the message.
    pub capabilities: Vec<String>,

    /// The token correlating this message with a reply or request.
    pub token: Token,

    /// The sections carried by the message.
    pub content: Vec<Section>,

    /// Signatures by the infrastructure key of the originating server.
    pub signatures: Vec<Signature>,
}

impl Message {
    /// Creates an empty message with the given token.
    pub fn new(token: Token) -> Self {
        Message {
            capabilities: Vec::new(),
            token,
            content: Vec::new(),
            signatures: Vec::new(),
        }
    }

    /// Creates a message carrying the given sections.
    pub fn with_content(token: Token, content: Vec<Section>) -> Self {
        Message {
            capabilities: Vec::new(),
            token,
            content,
            signatures: Vec::new(),
        }
    }

    /// Sorts the content into the canonical message order.
    ///
    /// Sections are grouped by kind and each group is ordered by its
    /// canonical comparator, yielding a deterministic sequence for
    /// message-level signing.
    pub fn sort(&mut self) {
        for section in &mut self.content {
            match section {
                Section::Assertion(a) => a.sort(),
                Section::Shard(s) => s.sort(),
                Section::Zone(z) => z.sort(),
                Section::Query(q) => q.sort(),
                Section::AddressAssertion(a) => a.sort(),
                Section::AddressZone(z) => z.sort(),
                _ => {}
            }
        }
        self.content.sort_by(compare_sections);
    }
}

/// The rank of a section kind in the canonical message order.
fn section_rank(section: &Section) -> u8 {
    match section {
        Section::AddressQuery(_) => 0,
        Section::AddressZone(_) => 1,
        Section::AddressAssertion(_) => 2,
        Section::Assertion(_) => 3,
        Section::Shard(_) => 4,
        Section::Zone(_) => 5,
        Section::Query(_) => 6,
        Section::Notification(_) => 7,
    }
}

/// Compares two sections for the canonical message order.
fn compare_sections(a: &Section, b: &Section) -> Ordering {
    section_rank(a).cmp(&section_rank(b)).then_with(|| match (a, b) {
        (Section::Assertion(a), Section::Assertion(b)) => a.canonical_cmp(b),
        (Section::Shard(a), Section::Shard(b)) => a.canonical_cmp(b),
        (Section::Zone(a), Section::Zone(b)) => a
            .subject_zone
            .cmp(&b.subject_zone)
            .then_with(|| a.context.cmp(&b.context)),
        (Section::Query(a), Section::Query(b)) => {
            a.name.cmp(&b.name).then_with(|| a.context.cmp(&b.context))
        }
        (Section::Notification(a), Section::Notification(b)) => {
            a.kind.cmp(&b.kind).then_with(|| a.data.cmp(&b.data))
        }
        (Section::AddressAssertion(a), Section::AddressAssertion(b)) => {
            a.subject_addr.cmp(&b.subject_addr)
        }
        (Section::AddressZone(a), Section::AddressZone(b)) => {
            a.subject_addr.cmp(&b.subject_addr)
        }
        (Section::AddressQuery(a), Section::AddressQuery(b)) => {
            a.subject_addr.cmp(&b.subject_addr)
        }
        _ => Ordering::Equal,
    })
}

//------------ Stream framing ------------------------------------------------

/// Reads one length-prefixed message from a stream.
///
/// Frames longer than `max_len` are rejected without decoding.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_len: usize,
) -> Result<Message, WireError> {
    let len = reader.read_u32().await? as usize;
    if len > max_len {
        return Err(WireError::MessageTooLarge(len));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    decode_message(&buf)
}

/// Writes one length-prefixed message to a stream.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &Message,
) -> Result<(), WireError> {
    let buf = encode_message(msg)?;
    writer.write_u32(buf.len() as u32).await?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

//------------ WireError -----------------------------------------------------

/// An error encoding or decoding a message.
#[derive(Debug)]
pub enum WireError {
    /// The message exceeded the configured maximum length.
    MessageTooLarge(usize),

    /// The data did not start with the RAINS message tag.
    BadTag,

    /// A mandatory field was absent.
    MissingField(&'static str),

    /// A field held a value of an unexpected shape.
    UnexpectedValue(&'static str),

    /// The section type code is not part of the wire format.
    UnsupportedSection(&'static str),

    /// The CBOR layer failed.
    Cbor(serde_cbor::Error),

    /// Reading from or writing to the stream failed.
    Io(std::io::Error),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WireError::MessageTooLarge(len) => {
                write!(f, "message of {} bytes exceeds size limit", len)
            }
            WireError::BadTag => write!(f, "missing RAINS message tag"),
            WireError::MissingField(field) => {
                write!(f, "missing mandatory field '{}'", field)
            }
            WireError::UnexpectedValue(what) => {
                write!(f, "unexpected value for {}", what)
            }
            WireError::UnsupportedSection(kind) => {
                write!(f, "section kind '{}' has no wire encoding", kind)
            }
            WireError::Cbor(err) => write!(f, "CBOR error: {}", err),
            WireError::Io(err) => write!(f, "stream error: {}", err),
        }
    }
}

impl error::Error for WireError {}

impl From<serde_cbor::Error> for WireError {
    fn from(err: serde_cbor::Error) -> Self {
        WireError::Cbor(err)
    }
}

impl From<std::io::Error> for WireError {
    fn from(err: std::io::Error) -> Self {
        WireError::Io(err)
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::codes::{
        KeySpace, NotificationType, ObjectType, QueryOpt, SigAlg,
    };
    use crate::base::keys::{PublicKeyId, Signature};
    use crate::base::object::{delegation, NameAlias, Object, ServiceInfo};
    use crate::base::section::{
        Assertion, Notification, Query, Shard, Signed, Zone, ZoneContent,
    };
    use bytes::Bytes;
    use std::net::Ipv4Addr;

    fn sample_signature() -> Signature {
        Signature {
            id: PublicKeyId {
                algorithm: SigAlg::Ed25519,
                key_space: KeySpace::Rains,
                key_phase: 5,
            },
            valid_since: 1_000,
            valid_until: 2_000,
            data: Bytes::from_static(&[7u8; 64]),
        }
    }

    fn sample_assertion() -> Assertion {
        let mut a = Assertion::new("ch", ".", ".");
        a.content.push(delegation(
            SigAlg::Ed25519,
            5,
            1_000,
            2_000,
            Bytes::from_static(&[1u8; 32]),
        ));
        a.content.push(Object::Ip4(Ipv4Addr::new(192, 0, 2, 1)));
        a.content.push(Object::ServiceInfo(ServiceInfo {
            name: "ns.ch".into(),
            port: 55553,
            priority: 0,
        }));
        a.content.push(Object::Name(NameAlias {
            name: "alias.ch".into(),
            types: vec![ObjectType::Ip4, ObjectType::Ip6],
        }));
        a.signatures.push(sample_signature());
        a
    }

    #[test]
    fn message_round_trip() {
        let mut shard = Shard::new("ch", ".", "a", "m");
        shard.content.push(sample_assertion());
        shard.signatures.push(sample_signature());

        let mut zone = Zone::new("ch", ".");
        zone.content.push(ZoneContent::Assertion(sample_assertion()));
        zone.content.push(ZoneContent::Shard(shard.clone()));
        zone.signatures.push(sample_signature());

        let mut query =
            Query::new("www.ch", ".", vec![ObjectType::Ip4], 5_000);
        query.options.push(QueryOpt::CachedAnswersOnly);

        let msg = Message {
            capabilities: vec![CAP_TLS_OVER_TCP.into()],
            token: Token::new(),
            content: vec![
                Section::Assertion(sample_assertion()),
                Section::Shard(shard),
                Section::Zone(zone),
                Section::Query(query),
                Section::Notification(Notification::new(
                    Token::new(),
                    NotificationType::NoAssertionAvail,
                )),
            ],
            signatures: vec![sample_signature()],
        };

        let bytes = encode_message(&msg).unwrap();
        let decoded = decode_message(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn decoding_requires_tag() {
        let msg = Message::new(Token::new());
        let mut bytes = encode_message(&msg).unwrap();
        bytes[0] = 0xa0;
        assert!(matches!(
            decode_message(&bytes),
            Err(WireError::BadTag)
        ));
    }

    #[test]
    fn sig_bytes_ignore_signatures_and_content_order() {
        let mut a = sample_assertion();
        let with_sig =
            signed_sig_bytes(&Signed::Assertion(a.clone())).unwrap();

        a.signatures.clear();
        a.content.reverse();
        let without_sig =
            signed_sig_bytes(&Signed::Assertion(a)).unwrap();

        assert_eq!(with_sig, without_sig);
    }

    #[test]
    fn sig_bytes_depend_on_subject() {
        let a = Assertion::new("www", "ch", ".");
        let b = Assertion::new("mail", "ch", ".");
        assert_ne!(
            signed_sig_bytes(&Signed::Assertion(a)).unwrap(),
            signed_sig_bytes(&Signed::Assertion(b)).unwrap()
        );
    }

    #[tokio::test]
    async fn framing_round_trip() {
        let msg = Message::with_content(
            Token::new(),
            vec![Section::Assertion(sample_assertion())],
        );
        let mut cursor = std::io::Cursor::new(Vec::new());
        write_message(&mut cursor, &msg).await.unwrap();

        let mut cursor = std::io::Cursor::new(cursor.into_inner());
        let decoded = read_message(&mut cursor, 1 << 16).await.unwrap();
        assert_eq!(msg, decoded);
    }

    #[tokio::test]
    async fn framing_rejects_oversize() {
        let msg = Message::new(Token::new());
        let mut cursor = std::io::Cursor::new(Vec::new());
        write_message(&mut cursor, &msg).await.unwrap();

        let mut cursor = std::io::Cursor::new(cursor.into_inner());
        assert!(matches!(
            read_message(&mut cursor, 4).await,
            Err(WireError::MessageTooLarge(_))
        ));
    }
}
