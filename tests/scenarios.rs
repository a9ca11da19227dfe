//! End-to-end scenarios for the verification pipeline.
//!
//! These tests drive the verifier, key stores, pending-signature store,
//! and engine together the way inbound traffic would, with real ed25519
//! signatures.

use bytes::Bytes;
use parking_lot::Mutex;
use rains::base::codes::{KeySpace, NotificationType, ObjectType, SigAlg};
use rains::base::keys::{PublicKey, PublicKeyId};
use rains::base::object::Object;
use rains::base::section::{
    Assertion, Query, Section, Shard, Signed,
};
use rains::base::token::Token;
use rains::base::unix_now;
use rains::cache::keys::KeyStores;
use rains::cache::pending::PendingSignatures;
use rains::config::Config;
use rains::engine::Engine;
use rains::server::Outbound;
use rains::verify::{sign_section, Verifier};
use rains::wire;
use ring::rand::SystemRandom;
use ring::signature::Ed25519KeyPair;
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;

//------------ Test fixture --------------------------------------------------

struct Fixture {
    keys: Arc<KeyStores>,
    pending: Arc<PendingSignatures>,
    engine: Arc<Engine>,
    verifier: Verifier,
    out_rx: mpsc::UnboundedReceiver<Outbound>,
    root: Ed25519KeyPair,
    now: i64,
}

fn keypair() -> Ed25519KeyPair {
    let rng = SystemRandom::new();
    let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
    Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap()
}

fn key_id(phase: u64) -> PublicKeyId {
    PublicKeyId {
        algorithm: SigAlg::Ed25519,
        key_space: KeySpace::Rains,
        key_phase: phase,
    }
}

fn public_key(
    keypair: &Ed25519KeyPair,
    context: &str,
    zone: &str,
    phase: u64,
    valid_until: i64,
) -> PublicKey {
    use ring::signature::KeyPair;
    PublicKey {
        id: key_id(phase),
        valid_since: 0,
        valid_until,
        context: context.into(),
        zone: zone.into(),
        key: Bytes::copy_from_slice(keypair.public_key().as_ref()),
    }
}

fn fixture() -> Fixture {
    let config = Config {
        root_name_servers: vec!["192.0.2.53:55553".parse().unwrap()],
        ..Default::default()
    };
    let config = Arc::new(config);
    let now = unix_now();
    let keys = Arc::new(KeyStores::new(&config).unwrap());
    let root = keypair();
    // Pin the root key the way startup does from the trust anchor file.
    keys.zone.pin(public_key(&root, ".", ".", 5, now + 86_400));

    let pending = Arc::new(
        PendingSignatures::new(config.pending_signature_cache_size)
            .unwrap(),
    );
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let engine = Arc::new(
        Engine::new(config.clone(), keys.clone(), None, out_tx.clone())
            .unwrap(),
    );
    let verifier = Verifier::new(
        config,
        keys.clone(),
        pending.clone(),
        engine.clone(),
        out_tx,
        Arc::new(Mutex::new(HashSet::new())),
    );
    Fixture {
        keys,
        pending,
        engine,
        verifier,
        out_rx,
        root,
        now,
    }
}

fn peer() -> SocketAddr {
    "192.0.2.99:5022".parse().unwrap()
}

/// Signs an assertion and hands it back.
fn sign_assertion(
    mut assertion: Assertion,
    keypair: &Ed25519KeyPair,
    phase: u64,
    valid_until: i64,
) -> Assertion {
    let mut signed = Signed::Assertion(assertion);
    sign_section(&mut signed, keypair, key_id(phase), 0, valid_until)
        .unwrap();
    match signed {
        Signed::Assertion(a) => {
            assertion = a;
        }
        _ => unreachable!(),
    }
    assertion
}

/// A delegation assertion for `ch` in the root zone, signed by the root.
fn ch_delegation(
    fixture: &Fixture,
    child: &Ed25519KeyPair,
) -> Assertion {
    let mut assertion = Assertion::new("ch", ".", ".");
    assertion.content.push(Object::Delegation(public_key(
        child,
        "",
        "",
        5,
        fixture.now + 3_600,
    )));
    sign_assertion(assertion, &fixture.root, 5, fixture.now + 3_600)
}

/// An address assertion for `www.ch`, signed by the child key.
fn www_assertion(fixture: &Fixture, child: &Ed25519KeyPair) -> Assertion {
    let mut assertion = Assertion::new("www", "ch", ".");
    assertion
        .content
        .push(Object::Ip4(Ipv4Addr::new(192, 0, 2, 80)));
    sign_assertion(assertion, child, 5, fixture.now + 3_600)
}

fn delegation_query(name: &str) -> Query {
    Query::new(
        name,
        ".",
        vec![ObjectType::Delegation],
        unix_now() + 60,
    )
}

//------------ Scenarios -----------------------------------------------------

/// Happy path: a root-signed delegation is stored and its key installed.
#[test]
fn delegation_from_root_installs_child_key() {
    let mut fixture = fixture();
    let child = keypair();
    let assertion = ch_delegation(&fixture, &child);

    fixture
        .verifier
        .verify(Section::Assertion(assertion), peer(), Token::new());

    // The delegated key is in the zone-key cache under (., ch, ed25519).
    let id = rains::base::keys::KeyId::new(".", "ch", SigAlg::Ed25519);
    let installed = fixture.keys.zone.get(&id).expect("key not installed");
    assert_eq!(installed.id.key_phase, 5);
    assert_eq!(installed.zone, "ch");

    // The assertion itself is resident and answers delegation queries.
    let answer = fixture
        .engine
        .answer(&delegation_query("ch"), fixture.now);
    assert_eq!(answer.len(), 1);

    // Nothing was parked and no query was emitted.
    assert!(fixture.pending.is_empty());
    assert!(fixture.out_rx.try_recv().is_err());
}

/// A section whose delegation key is unknown parks and asks upstream.
#[test]
fn missing_delegation_parks_section_and_queries() {
    let mut fixture = fixture();
    let child = keypair();
    let assertion = www_assertion(&fixture, &child);

    fixture
        .verifier
        .verify(Section::Assertion(assertion), peer(), Token::new());

    // Parked, not stored.
    assert_eq!(fixture.pending.len(), 1);
    assert!(fixture
        .engine
        .answer(
            &Query::new(
                "www.ch",
                ".",
                vec![ObjectType::Ip4],
                fixture.now + 60
            ),
            fixture.now
        )
        .is_empty());

    // A delegation query for (., ch) went to the upstream delegate.
    match fixture.out_rx.try_recv().unwrap() {
        Outbound::Message { dest, msg } => {
            assert_eq!(dest.port(), 55553);
            match &msg.content[0] {
                Section::Query(query) => {
                    assert_eq!(query.name, "ch");
                    assert_eq!(query.context, ".");
                    assert_eq!(
                        query.types,
                        vec![ObjectType::Delegation]
                    );
                }
                other => panic!("unexpected section: {:?}", other),
            }
        }
        other => panic!("unexpected outbound: {:?}", other),
    }

    // A second section for the same zone does not query again.
    let second = www_assertion(&fixture, &child);
    fixture
        .verifier
        .verify(Section::Assertion(second), peer(), Token::new());
    assert_eq!(fixture.pending.len(), 2);
    assert!(fixture.out_rx.try_recv().is_err());
}

/// The arriving delegation unblocks parked sections.
#[test]
fn delegation_arrival_resumes_parked_sections() {
    let mut fixture = fixture();
    let child = keypair();

    // Park a section for www.ch first.
    let assertion = www_assertion(&fixture, &child);
    fixture
        .verifier
        .verify(Section::Assertion(assertion), peer(), Token::new());
    assert_eq!(fixture.pending.len(), 1);
    let _delegation_query = fixture.out_rx.try_recv().unwrap();

    // Now the delegation arrives.
    let delegation = ch_delegation(&fixture, &child);
    fixture
        .verifier
        .verify(Section::Assertion(delegation), peer(), Token::new());

    // The parked section was re-verified and stored; the bucket is gone.
    assert!(fixture.pending.is_empty());
    let answer = fixture.engine.answer(
        &Query::new("www.ch", ".", vec![ObjectType::Ip4], fixture.now + 60),
        fixture.now,
    );
    assert_eq!(answer.len(), 1);
}

/// Re-verification after the key arrived leaves exactly one copy.
#[test]
fn reverification_is_idempotent() {
    let mut fixture = fixture();
    let child = keypair();
    let delegation = ch_delegation(&fixture, &child);
    fixture
        .verifier
        .verify(Section::Assertion(delegation), peer(), Token::new());

    let assertion = www_assertion(&fixture, &child);
    for _ in 0..3 {
        fixture.verifier.verify(
            Section::Assertion(assertion.clone()),
            peer(),
            Token::new(),
        );
    }

    let answer = fixture.engine.answer(
        &Query::new("www.ch", ".", vec![ObjectType::Ip4], fixture.now + 60),
        fixture.now,
    );
    assert_eq!(answer.len(), 1);
    // No delegation query was emitted: all keys were present.
    assert!(fixture.out_rx.try_recv().is_err());
}

/// An inconsistent shard is reported and dropped.
#[test]
fn inconsistent_shard_notifies_the_sender() {
    let mut fixture = fixture();
    let token = Token::new();

    let mut shard = Shard::new("ch", ".", "a", "m");
    shard.content.push(Assertion::new("z", "ch", "."));

    fixture
        .verifier
        .verify(Section::Shard(shard), peer(), token);

    match fixture.out_rx.try_recv().unwrap() {
        Outbound::Message { dest, msg } => {
            assert_eq!(dest, peer());
            match &msg.content[0] {
                Section::Notification(note) => {
                    assert_eq!(
                        note.kind,
                        NotificationType::RcvInconsistentMsg
                    );
                    assert_eq!(note.token, token);
                }
                other => panic!("unexpected section: {:?}", other),
            }
        }
        other => panic!("unexpected outbound: {:?}", other),
    }

    // Neither the shard nor its assertion was stored.
    assert!(fixture
        .engine
        .answer(
            &Query::new(
                "z.ch",
                ".",
                vec![ObjectType::Ip4],
                fixture.now + 60
            ),
            fixture.now
        )
        .is_empty());
    assert!(fixture.pending.is_empty());
}

/// An expired signature is stripped, the valid one carries the section.
#[test]
fn expired_signature_is_stripped() {
    let mut fixture = fixture();
    let child = keypair();
    let delegation = ch_delegation(&fixture, &child);
    fixture
        .verifier
        .verify(Section::Assertion(delegation), peer(), Token::new());

    // Two signatures by the child key: one long expired, one alive.
    let mut assertion = Assertion::new("www", "ch", ".");
    assertion
        .content
        .push(Object::Ip4(Ipv4Addr::new(192, 0, 2, 80)));
    let assertion =
        sign_assertion(assertion, &child, 5, fixture.now - 1);
    let assertion =
        sign_assertion(assertion, &child, 5, fixture.now + 600);

    fixture
        .verifier
        .verify(Section::Assertion(assertion), peer(), Token::new());

    let answer = fixture.engine.answer(
        &Query::new("www.ch", ".", vec![ObjectType::Ip4], fixture.now + 60),
        fixture.now,
    );
    assert_eq!(answer.len(), 1);
    match &answer[0] {
        Section::Assertion(stored) => {
            assert_eq!(stored.signatures.len(), 1);
            assert_eq!(stored.signatures[0].valid_until, fixture.now + 600);
            // Validity is the signature window intersected with the key
            // and clamped; here the signature is the tightest bound.
            assert!(stored.valid_until() <= fixture.now + 600);
            assert!(stored.valid_until() > fixture.now);
        }
        other => panic!("unexpected section: {:?}", other),
    }
}

/// A bad signature under a known key drops the section silently.
#[test]
fn wrong_signature_is_dropped_without_notification() {
    let mut fixture = fixture();
    let child = keypair();
    let delegation = ch_delegation(&fixture, &child);
    fixture
        .verifier
        .verify(Section::Assertion(delegation), peer(), Token::new());

    // Signed by an unrelated key but claiming the child's identity.
    let impostor = keypair();
    let assertion = www_assertion(&fixture, &impostor);
    fixture
        .verifier
        .verify(Section::Assertion(assertion), peer(), Token::new());

    assert!(fixture
        .engine
        .answer(
            &Query::new(
                "www.ch",
                ".",
                vec![ObjectType::Ip4],
                fixture.now + 60
            ),
            fixture.now
        )
        .is_empty());
    // Signature failures yield no oracle to the sender.
    assert!(fixture.out_rx.try_recv().is_err());
}

/// An empty zone is structurally valid, if useless.
#[test]
fn empty_zone_is_structurally_valid() {
    let mut fixture = fixture();
    let child = keypair();
    let delegation = ch_delegation(&fixture, &child);
    fixture
        .verifier
        .verify(Section::Assertion(delegation), peer(), Token::new());

    let mut zone =
        Signed::Zone(rains::base::section::Zone::new("ch", "."));
    sign_section(&mut zone, &child, key_id(5), 0, fixture.now + 600)
        .unwrap();
    let Signed::Zone(zone) = zone else { unreachable!() };

    fixture
        .verifier
        .verify(Section::Zone(zone), peer(), Token::new());

    // No inconsistency notification, nothing parked.
    assert!(fixture.out_rx.try_recv().is_err());
    assert!(fixture.pending.is_empty());
}

/// Message-level signatures verify against the infrastructure key.
#[test]
fn message_signature_checks_against_infrastructure_key() {
    let fixture = fixture();
    let infra = keypair();
    fixture
        .keys
        .infrastructure
        .install(public_key(&infra, ".", "ns.ch", 0, fixture.now + 600));

    let mut msg = wire::Message::with_content(
        Token::new(),
        vec![Section::Assertion(Assertion::new("www", "ch", "."))],
    );
    let bytes = wire::message_sig_bytes(&msg).unwrap();
    msg.signatures.push(rains::base::keys::Signature {
        id: key_id(0),
        valid_since: 0,
        valid_until: fixture.now + 600,
        data: Bytes::copy_from_slice(infra.sign(&bytes).as_ref()),
    });

    assert!(fixture
        .verifier
        .valid_message_signature(&msg, Some((".", "ns.ch"))));
    // The wrong peer identity does not verify.
    assert!(!fixture
        .verifier
        .valid_message_signature(&msg, Some((".", "ns.ee"))));
    // Unsigned messages pass.
    let unsigned = wire::Message::new(Token::new());
    assert!(fixture.verifier.valid_message_signature(&unsigned, None));
}
