//! A library for the RAINS naming protocol.
//!
//! RAINS is a naming system in which every answer is a signed assertion and
//! a server must validate a chain of delegations up to a trust root before
//! trusting or re-serving any name data. This crate implements the
//! verification and resolution core of such a server:
//!
//! * [base] contains the data model: sections, typed objects, signatures,
//!   public keys, tokens, and the protocol code enums.
//! * [wire] implements the CBOR message codec, the canonical signing
//!   encoding, and stream framing.
//! * [cache] provides the bounded validity cache all stores are built on,
//!   the public-key stores, and the pending-signature store.
//! * [verify] checks structural consistency and signatures of incoming
//!   sections, parking sections whose delegation key is still unknown and
//!   resuming them when the key arrives.
//! * [engine] stores verified sections and answers queries from them.
//! * [resolve] is a recursive resolver that follows redirections from a
//!   set of root servers to an authoritative answer.
//! * [server] ties the pieces together: worker pools, dispatch, reapers,
//!   and shutdown.
//!
//! The TCP/TLS connection layer, metric exporters, and the executable
//! around this core are intentionally not part of this crate; they talk to
//! it through [wire::Message] values and the outbound channel of
//! [server::Core].

pub mod base;
pub mod cache;
pub mod config;
pub mod engine;
pub mod resolve;
pub mod server;
pub mod verify;
pub mod wire;
