//! Section verification.
//!
//! Every section arriving from the wire passes through the [Verifier]
//! before anything else may happen to it. Composite sections are first
//! checked for structural consistency: contained assertions must share the
//! outer context and zone and must lie within their shard's range, and a
//! violation is reported back to the sender. The verifier then computes
//! the set of public keys the signatures reference. If any of them is
//! unknown, the section is parked in the pending-signature store and, if
//! no delegation query for that (context, zone) is already in flight, one
//! is emitted towards the configured upstream delegate.
//!
//! With all keys at hand, every signature is checked against the canonical
//! encoding of its section. Expired signatures are stripped; a single
//! failing signature drops the whole section without any notification (a
//! signature failure must not become an oracle for the sender). Each
//! verified signature widens the section's effective validity by the
//! intersection of the signature's and the key's windows, clamped to the
//! configured maximum for the section kind. Surviving sections are handed
//! to the engine with the authoritative flag, and any delegation keys the
//! engine installs cause the matching pending buckets to be drained and
//! re-verified. Re-verification of a section that is already stored is a
//! no-op in the engine, so duplicate resumptions are harmless.

use crate::base::codes::{KeySpace, ObjectType};
use crate::base::keys::{KeyId, PublicKey, Signature};
use crate::base::section::{
    AddressAssertion, Assertion, Notification, Query, Section, Shard,
    Signed, Zone, ZoneContent,
};
use crate::base::token::Token;
use crate::base::unix_now;
use crate::cache::keys::KeyStores;
use crate::cache::pending::{PendingEntry, PendingSignatures};
use crate::config::Config;
use crate::engine::Engine;
use crate::server::Outbound;
use crate::wire::{self, Message};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub use self::crypto::{sign_section, verify_signature};

mod crypto;

//------------ Verifier ------------------------------------------------------

/// Checks consistency and signatures of inbound sections.
#[derive(Debug)]
pub struct Verifier {
    config: Arc<Config>,
    keys: Arc<KeyStores>,
    pending: Arc<PendingSignatures>,
    engine: Arc<Engine>,
    out: mpsc::UnboundedSender<Outbound>,
    active_tokens: Arc<Mutex<HashSet<Token>>>,
    authorities: HashSet<(String, String)>,
}

impl Verifier {
    /// Creates a verifier over the given shared state.
    pub fn new(
        config: Arc<Config>,
        keys: Arc<KeyStores>,
        pending: Arc<PendingSignatures>,
        engine: Arc<Engine>,
        out: mpsc::UnboundedSender<Outbound>,
        active_tokens: Arc<Mutex<HashSet<Token>>>,
    ) -> Self {
        let authorities = config.authorities();
        Verifier {
            config,
            keys,
            pending,
            engine,
            out,
            active_tokens,
            authorities,
        }
    }

    /// Verifies one section received from `sender` under `token`.
    ///
    /// Signed sections go through consistency and signature checks and,
    /// if they survive, into the engine. Queries are validated and handed
    /// to the engine for answering. Everything this produces leaves
    /// through the outbound channel.
    pub fn verify(&self, section: Section, sender: SocketAddr, token: Token) {
        let now = unix_now();
        match section {
            Section::Query(query) => {
                if query.expired(now) {
                    debug!(%query, "dropping expired query");
                    return;
                }
                self.engine.handle_query(query, sender);
            }
            Section::AddressQuery(query) => {
                if query.expired(now) {
                    debug!("dropping expired address query");
                    return;
                }
                self.engine.handle_address_query(query, sender);
            }
            Section::Notification(notification) => {
                // Notifications are handled by the dispatcher; one ending
                // up here is a routing error worth noting.
                warn!(
                    kind = %notification.kind,
                    "notification reached the verifier"
                );
            }
            other => match other.into_signed() {
                Ok(signed) => {
                    self.verify_signed(signed, sender, token, now)
                }
                Err(section) => {
                    warn!(
                        kind = section.type_name(),
                        "unsupported section kind"
                    );
                }
            },
        }
    }

    /// Re-verifies every section parked for a (context, zone).
    ///
    /// Invoked after a delegation for the pair was installed. Must not be
    /// called while any key-store lock is held.
    pub fn resume(&self, context: &str, zone: &str) {
        let parked = self.pending.get_and_remove_all(context, zone);
        if parked.is_empty() {
            return;
        }
        info!(
            context,
            zone,
            sections = parked.len(),
            "delegation arrived, resuming parked sections"
        );
        for entry in parked {
            self.verify(entry.section.into(), entry.sender, entry.token);
        }
    }

    /// Checks the message-level signatures of `msg`.
    ///
    /// Message signatures are made by the infrastructure key of the
    /// originating server; `peer` names the (context, zone) that server
    /// speaks for, if known. An unsigned message passes. A signed message
    /// from an unidentified peer, or with any unverifiable signature, is
    /// rejected.
    pub fn valid_message_signature(
        &self,
        msg: &Message,
        peer: Option<(&str, &str)>,
    ) -> bool {
        if msg.signatures.is_empty() {
            return true;
        }
        let Some((context, zone)) = peer else {
            debug!("signed message from unidentified peer");
            return false;
        };
        let bytes = match wire::message_sig_bytes(msg) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(%err, "cannot compute message signature bytes");
                return false;
            }
        };
        let now = unix_now();
        msg.signatures.iter().all(|sig| {
            if sig.id.key_space != KeySpace::Rains {
                return true;
            }
            if sig.expired(now) {
                return false;
            }
            let id = KeyId::new(context, zone, sig.id.algorithm);
            match self.keys.infrastructure.get(&id) {
                Some(key) => crypto::verify_signature(
                    sig.id.algorithm,
                    &key.key,
                    &bytes,
                    &sig.data,
                ),
                None => false,
            }
        })
    }

    //--- Signed sections

    fn verify_signed(
        &self,
        mut section: Signed,
        sender: SocketAddr,
        token: Token,
        now: i64,
    ) {
        if !self.consistent(&section) {
            warn!(%section, "inconsistent section");
            self.notify(
                sender,
                token,
                crate::base::codes::NotificationType::RcvInconsistentMsg,
            );
            return;
        }

        let needed = needed_keys(&section);
        let (present, missing) = self.lookup_keys(&needed);
        if !missing.is_empty() {
            debug!(
                %section,
                missing = missing.len(),
                "public keys missing, parking section"
            );
            self.park(section, sender, token, now);
            return;
        }

        if !self.validate_signatures(&mut section, &present, now) {
            // An invalid signature is dropped without notification; the
            // sender is untrusted by definition.
            debug!(%section, "dropping section with invalid signatures");
            return;
        }
        if section.validity_window_empty() {
            debug!(%section, "no signature contributed a validity window");
            return;
        }

        let key = (
            section.context().to_string(),
            section.subject_zone(),
        );
        let authoritative = self.authorities.contains(&key);
        let drain = self.engine.assert(section, authoritative);
        // Drainage happens here, outside any store lock.
        for (context, zone) in drain {
            self.resume(&context, &zone);
        }
    }

    /// Checks structural consistency of composite sections.
    fn consistent(&self, section: &Signed) -> bool {
        match section {
            Signed::Assertion(_) | Signed::AddressAssertion(_) => true,
            Signed::Shard(shard) => self.consistent_shard(shard),
            Signed::Zone(zone) => self.consistent_zone(zone),
            Signed::AddressZone(zone) => zone
                .content
                .iter()
                .all(|contained| contained.context == zone.context),
        }
    }

    fn consistent_shard(&self, shard: &Shard) -> bool {
        shard.content.iter().all(|assertion| {
            let matches = assertion.context == shard.context
                && assertion.subject_zone == shard.subject_zone;
            if !matches {
                warn!(
                    %shard, %assertion,
                    "contained assertion's context or zone is inconsistent"
                );
                return false;
            }
            if !shard.in_range(&assertion.subject_name) {
                warn!(
                    %shard,
                    subject = %assertion.subject_name,
                    "contained assertion outside the shard's range"
                );
                return false;
            }
            true
        })
    }

    fn consistent_zone(&self, zone: &Zone) -> bool {
        zone.content.iter().all(|element| match element {
            ZoneContent::Assertion(assertion) => {
                let matches = assertion.context == zone.context
                    && assertion.subject_zone == zone.subject_zone;
                if !matches {
                    warn!(
                        %zone, %assertion,
                        "contained assertion's context or zone is \
                         inconsistent"
                    );
                }
                matches
            }
            ZoneContent::Shard(shard) => {
                let matches = shard.context == zone.context
                    && shard.subject_zone == zone.subject_zone;
                if !matches {
                    warn!(
                        %zone, %shard,
                        "contained shard's context or zone is inconsistent"
                    );
                    return false;
                }
                self.consistent_shard(shard)
            }
        })
    }

    /// Splits the needed keys into the present and the missing ones.
    fn lookup_keys(
        &self,
        needed: &HashSet<KeyId>,
    ) -> (HashMap<KeyId, PublicKey>, Vec<KeyId>) {
        let mut present = HashMap::new();
        let mut missing = Vec::new();
        for id in needed {
            match self.keys.zone.get(id) {
                Some(key) => {
                    present.insert(id.clone(), key);
                }
                None => missing.push(id.clone()),
            }
        }
        (present, missing)
    }

    /// Parks a section and emits a delegation query if none is in flight.
    fn park(
        &self,
        section: Signed,
        sender: SocketAddr,
        token: Token,
        now: i64,
    ) {
        let context = section.context().to_string();
        let zone = section.subject_zone();
        let valid_until = pending_validity(
            &section,
            self.config.delegation_query_validity(),
            now,
        );
        let first = self.pending.add(
            &context,
            &zone,
            PendingEntry {
                section,
                sender,
                token,
                valid_until,
            },
        );
        if !first {
            debug!(
                %context,
                %zone, "delegation query already in flight"
            );
            return;
        }
        let Some(delegate) = self.config.delegation_address(&context, &zone)
        else {
            warn!(
                %context,
                %zone, "no delegate configured for delegation query"
            );
            return;
        };
        let query_token = Token::new();
        self.active_tokens.lock().insert(query_token);
        let mut query = Query::new(
            zone.clone(),
            context.clone(),
            vec![ObjectType::Delegation],
            valid_until,
        );
        query.token = query_token;
        info!(%context, %zone, %delegate, "emitting delegation query");
        let msg =
            Message::with_content(query_token, vec![Section::Query(query)]);
        if self
            .out
            .send(Outbound::Message {
                dest: delegate,
                msg,
            })
            .is_err()
        {
            warn!("outbound channel closed, dropping delegation query");
        }
    }

    /// Validates all signatures on the section and its content.
    ///
    /// Expired signatures are stripped. Returns `false`, meaning the
    /// section must be dropped, when any signature fails to verify or
    /// when any unit ends up without a verified signature.
    fn validate_signatures(
        &self,
        section: &mut Signed,
        keys: &HashMap<KeyId, PublicKey>,
        now: i64,
    ) -> bool {
        let max = &self.config.max_cache_validity;
        match section {
            Signed::Assertion(assertion) => {
                self.validate_assertion(assertion, keys, now)
            }
            Signed::Shard(shard) => self.validate_shard(shard, keys, now),
            Signed::Zone(zone) => {
                let bytes = match wire::signed_sig_bytes(
                    &Signed::Zone(zone.clone()),
                ) {
                    Ok(bytes) => bytes,
                    Err(_) => return false,
                };
                let context = zone.context.clone();
                let zone_name = zone.subject_zone.clone();
                let Some(windows) = self.check_unit(
                    &bytes,
                    &mut zone.signatures,
                    &context,
                    &zone_name,
                    keys,
                    now,
                ) else {
                    return false;
                };
                for (since, until) in windows {
                    zone.update_validity(since, until, max.zone(), now);
                }
                for element in &mut zone.content {
                    let ok = match element {
                        ZoneContent::Assertion(assertion) => {
                            self.validate_assertion(assertion, keys, now)
                        }
                        ZoneContent::Shard(shard) => {
                            self.validate_shard(shard, keys, now)
                        }
                    };
                    if !ok {
                        return false;
                    }
                }
                true
            }
            Signed::AddressAssertion(assertion) => {
                self.validate_address_assertion(assertion, keys, now)
            }
            Signed::AddressZone(zone) => {
                let bytes = match wire::signed_sig_bytes(
                    &Signed::AddressZone(zone.clone()),
                ) {
                    Ok(bytes) => bytes,
                    Err(_) => return false,
                };
                let context = zone.context.clone();
                let signing_zone =
                    Signed::AddressZone(zone.clone()).subject_zone();
                let Some(windows) = self.check_unit(
                    &bytes,
                    &mut zone.signatures,
                    &context,
                    &signing_zone,
                    keys,
                    now,
                ) else {
                    return false;
                };
                for (since, until) in windows {
                    zone.update_validity(
                        since,
                        until,
                        max.address_zone(),
                        now,
                    );
                }
                for assertion in &mut zone.content {
                    if !self
                        .validate_address_assertion(assertion, keys, now)
                    {
                        return false;
                    }
                }
                true
            }
        }
    }

    fn validate_assertion(
        &self,
        assertion: &mut Assertion,
        keys: &HashMap<KeyId, PublicKey>,
        now: i64,
    ) -> bool {
        let bytes = match wire::signed_sig_bytes(&Signed::Assertion(
            assertion.clone(),
        )) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let context = assertion.context.clone();
        let zone = assertion.subject_zone.clone();
        let Some(windows) = self.check_unit(
            &bytes,
            &mut assertion.signatures,
            &context,
            &zone,
            keys,
            now,
        ) else {
            return false;
        };
        let max = self.config.max_cache_validity.assertion();
        for (since, until) in windows {
            assertion.update_validity(since, until, max, now);
        }
        true
    }

    fn validate_shard(
        &self,
        shard: &mut Shard,
        keys: &HashMap<KeyId, PublicKey>,
        now: i64,
    ) -> bool {
        let bytes =
            match wire::signed_sig_bytes(&Signed::Shard(shard.clone())) {
                Ok(bytes) => bytes,
                Err(_) => return false,
            };
        let context = shard.context.clone();
        let zone = shard.subject_zone.clone();
        let Some(windows) = self.check_unit(
            &bytes,
            &mut shard.signatures,
            &context,
            &zone,
            keys,
            now,
        ) else {
            return false;
        };
        let max = self.config.max_cache_validity.shard();
        for (since, until) in windows {
            shard.update_validity(since, until, max, now);
        }
        shard
            .content
            .iter_mut()
            .all(|assertion| self.validate_assertion(assertion, keys, now))
    }

    fn validate_address_assertion(
        &self,
        assertion: &mut AddressAssertion,
        keys: &HashMap<KeyId, PublicKey>,
        now: i64,
    ) -> bool {
        let wrapped = Signed::AddressAssertion(assertion.clone());
        let bytes = match wire::signed_sig_bytes(&wrapped) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let context = assertion.context.clone();
        let zone = wrapped.subject_zone();
        let Some(windows) = self.check_unit(
            &bytes,
            &mut assertion.signatures,
            &context,
            &zone,
            keys,
            now,
        ) else {
            return false;
        };
        let max = self.config.max_cache_validity.address_assertion();
        for (since, until) in windows {
            assertion.update_validity(since, until, max, now);
        }
        true
    }

    /// Checks the signatures of one signed unit.
    ///
    /// Expired signatures are removed; signatures in a foreign key space
    /// are preserved untouched. Returns the validity intersections of the
    /// verified signatures, or `None` when the unit must be dropped: a
    /// signature failed, or nothing verifiable remains.
    fn check_unit(
        &self,
        sig_bytes: &[u8],
        signatures: &mut Vec<Signature>,
        context: &str,
        zone: &str,
        keys: &HashMap<KeyId, PublicKey>,
        now: i64,
    ) -> Option<Vec<(i64, i64)>> {
        if signatures.is_empty() {
            debug!(context, zone, "unit carries no signature");
            return None;
        }
        let mut windows = Vec::new();
        let mut index = 0;
        while index < signatures.len() {
            let sig = &signatures[index];
            if sig.id.key_space != KeySpace::Rains {
                // Foreign key space: preserved but not verified here.
                index += 1;
                continue;
            }
            if sig.expired(now) {
                debug!(
                    valid_until = sig.valid_until,
                    "stripping expired signature"
                );
                signatures.remove(index);
                continue;
            }
            let id = KeyId::new(context, zone, sig.id.algorithm);
            let Some(key) = keys.get(&id) else {
                // The key inventory should have caught this.
                warn!(%id, "no key for signature after lookup");
                return None;
            };
            if !crypto::verify_signature(
                sig.id.algorithm,
                &key.key,
                sig_bytes,
                &sig.data,
            ) {
                debug!(%id, "signature does not verify");
                return None;
            }
            windows.push((
                key.valid_since.max(sig.valid_since),
                key.valid_until.min(sig.valid_until),
            ));
            index += 1;
        }
        if windows.is_empty() {
            debug!(context, zone, "no verifiable signature remains");
            return None;
        }
        Some(windows)
    }

    fn notify(
        &self,
        dest: SocketAddr,
        token: Token,
        kind: crate::base::codes::NotificationType,
    ) {
        let msg = Message::with_content(
            Token::new(),
            vec![Section::Notification(Notification::new(token, kind))],
        );
        if self.out.send(Outbound::Message { dest, msg }).is_err() {
            warn!("outbound channel closed, dropping notification");
        }
    }
}

//------------ Key inventory -------------------------------------------------

/// Computes the key identifiers needed to verify a section.
///
/// Every unit needs the key of its (context, zone). An assertion carrying
/// a delegation among other objects additionally needs the key of the
/// delegated child so the new key can be registered; an assertion that is
/// nothing but delegations needs only the parent-zone key.
pub fn needed_keys(section: &Signed) -> HashSet<KeyId> {
    let mut needed = HashSet::new();
    match section {
        Signed::Assertion(assertion) => {
            assertion_keys(assertion, &mut needed)
        }
        Signed::Shard(shard) => shard_keys(shard, &mut needed),
        Signed::Zone(zone) => {
            unit_keys(
                zone.signatures.iter(),
                &zone.context,
                &zone.subject_zone,
                &mut needed,
            );
            for element in &zone.content {
                match element {
                    ZoneContent::Assertion(assertion) => {
                        assertion_keys(assertion, &mut needed)
                    }
                    ZoneContent::Shard(shard) => {
                        shard_keys(shard, &mut needed)
                    }
                }
            }
        }
        Signed::AddressAssertion(_) | Signed::AddressZone(_) => {
            unit_keys(
                section.signatures().iter(),
                section.context(),
                &section.subject_zone(),
                &mut needed,
            );
            if let Signed::AddressZone(zone) = section {
                let signing_zone = section.subject_zone();
                for assertion in &zone.content {
                    unit_keys(
                        assertion.signatures.iter(),
                        &assertion.context,
                        &signing_zone,
                        &mut needed,
                    );
                }
            }
        }
    }
    needed
}

fn assertion_keys(assertion: &Assertion, needed: &mut HashSet<KeyId>) {
    let contains_delegation = assertion.contains_delegation();
    let only_delegations = assertion.only_delegations();
    for sig in &assertion.signatures {
        if sig.id.key_space != KeySpace::Rains {
            continue;
        }
        needed.insert(KeyId::new(
            &*assertion.context,
            &*assertion.subject_zone,
            sig.id.algorithm,
        ));
        if contains_delegation && !only_delegations {
            needed.insert(KeyId::new(
                &*assertion.context,
                assertion.fqdn(),
                sig.id.algorithm,
            ));
        }
    }
}

fn shard_keys(shard: &Shard, needed: &mut HashSet<KeyId>) {
    unit_keys(
        shard.signatures.iter(),
        &shard.context,
        &shard.subject_zone,
        needed,
    );
    for assertion in &shard.content {
        assertion_keys(assertion, needed);
    }
}

fn unit_keys<'a>(
    signatures: impl Iterator<Item = &'a Signature>,
    context: &str,
    zone: &str,
    needed: &mut HashSet<KeyId>,
) {
    for sig in signatures {
        if sig.id.key_space != KeySpace::Rains {
            continue;
        }
        needed.insert(KeyId::new(context, zone, sig.id.algorithm));
    }
}

/// The lifetime of a pending entry and its delegation query.
///
/// The longest signature validity on the section, bounded by the
/// configured delegation query validity.
fn pending_validity(
    section: &Signed,
    delegation_query_validity: Duration,
    now: i64,
) -> i64 {
    let longest = section
        .signatures()
        .iter()
        .map(|sig| sig.valid_until)
        .max()
        .unwrap_or(0);
    let bound =
        now.saturating_add(delegation_query_validity.as_secs() as i64);
    longest.min(bound)
}

//------------ Reaper --------------------------------------------------------

/// Periodically sweeps the key stores and the pending-signature store.
///
/// Runs until the shutdown signal flips to `true`.
pub async fn run_reaper(
    keys: Arc<KeyStores>,
    pending: Arc<PendingSignatures>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                keys.zone.remove_expired();
                keys.infrastructure.remove_expired();
                keys.external.remove_expired();
                let swept = pending.remove_expired();
                if swept > 0 {
                    debug!(swept, "reaped expired pending sections");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

//============ Testing =======================================================
