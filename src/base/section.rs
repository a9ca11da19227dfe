//! Message sections.
//!
//! A message carries a sequence of sections. Assertions, shards, and zones
//! are signed and carry name data; queries ask for name data; notifications
//! report conditions about an earlier message. The address variants mirror
//! assertion, zone, and query for the reverse (address) tree.
//!
//! Signed sections cache an effective validity window, the running
//! intersection of the signature and key validities that verified them,
//! clamped to a configured maximum. The window starts out empty and is
//! widened by [`update_validity`] once per verified signature.
//!
//! [`update_validity`]: Signed::update_validity

use super::codes::{NotificationType, ObjectType, QueryOpt};
use super::keys::{PublicKey, Signature};
use super::object::Object;
use super::token::Token;
use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use tracing::warn;

//------------ Validity ------------------------------------------------------

/// The cached effective validity window of a signed section.
///
/// Starts out inverted (empty). `update` widens it monotonically but never
/// beyond `now + max_validity`.
#[derive(Clone, Copy, Debug, Default)]
struct Validity {
    since: i64,
    until: i64,
}

impl Validity {
    /// Widens the window to include `[since, until]`, clamped.
    fn update(
        &mut self,
        since: i64,
        until: i64,
        max_validity: Duration,
        now: i64,
    ) {
        if self.since == 0 {
            self.since = i64::MAX;
        }
        let ceiling = now.saturating_add(max_validity.as_secs() as i64);
        if since < self.since {
            if since > ceiling {
                warn!(since, ceiling, "valid-since exceeds maximum validity");
                self.since = ceiling;
            } else {
                self.since = since;
            }
        }
        if until > self.until {
            if until > ceiling {
                self.until = ceiling;
            } else {
                self.until = until;
            }
        }
    }

    /// Returns whether no verified signature contributed a window.
    fn is_empty(&self) -> bool {
        (self.since == 0 || self.since == i64::MAX) && self.until == 0
    }
}

//------------ Assertion -----------------------------------------------------

/// A signed statement binding a (name, zone, context) to typed objects.
#[derive(Clone, Debug)]
pub struct Assertion {
    /// The name within the zone the assertion speaks about.
    pub subject_name: String,

    /// The zone the name lives in.
    pub subject_zone: String,

    /// The context disambiguating independent name trees.
    pub context: String,

    /// The typed objects bound to the subject.
    pub content: Vec<Object>,

    /// Signatures over the canonical encoding of the assertion.
    pub signatures: Vec<Signature>,

    validity: Validity,
}

impl Assertion {
    /// Creates an empty assertion for the given subject.
    pub fn new(
        subject_name: impl Into<String>,
        subject_zone: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Assertion {
            subject_name: subject_name.into(),
            subject_zone: subject_zone.into(),
            context: context.into(),
            content: Vec::new(),
            signatures: Vec::new(),
            validity: Validity::default(),
        }
    }

    /// Returns the fully qualified name of the subject.
    pub fn fqdn(&self) -> String {
        if self.subject_name.is_empty() || self.subject_name == "@" {
            self.subject_zone.clone()
        } else if self.subject_zone == "." {
            self.subject_name.clone()
        } else {
            format!("{}.{}", self.subject_name, self.subject_zone)
        }
    }

    /// Returns whether any object is a delegation.
    pub fn contains_delegation(&self) -> bool {
        self.content
            .iter()
            .any(|o| matches!(o, Object::Delegation(_)))
    }

    /// Returns whether every object is a delegation.
    pub fn only_delegations(&self) -> bool {
        !self.content.is_empty()
            && self
                .content
                .iter()
                .all(|o| matches!(o, Object::Delegation(_)))
    }

    /// Returns the delegated public keys contained in this assertion.
    pub fn delegations(&self) -> impl Iterator<Item = &PublicKey> {
        self.content.iter().filter_map(|o| match o {
            Object::Delegation(pk) => Some(pk),
            _ => None,
        })
    }

    /// Sorts the content into the canonical order.
    pub fn sort(&mut self) {
        self.content.sort();
    }

    /// The canonical comparator over assertions.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.subject_name
            .cmp(&other.subject_name)
            .then_with(|| self.subject_zone.cmp(&other.subject_zone))
            .then_with(|| self.context.cmp(&other.context))
            .then_with(|| self.content.cmp(&other.content))
    }

    /// Widens the cached validity window, clamped to `now + max_validity`.
    pub fn update_validity(
        &mut self,
        since: i64,
        until: i64,
        max_validity: Duration,
        now: i64,
    ) {
        self.validity.update(since, until, max_validity, now);
    }

    /// The earliest time any verified signature makes this valid.
    pub fn valid_since(&self) -> i64 {
        self.validity.since
    }

    /// The latest time any verified signature keeps this valid.
    pub fn valid_until(&self) -> i64 {
        self.validity.until
    }
}

//--- PartialEq and Eq
//
// The cached validity window is bookkeeping, not identity: the same
// assertion verified twice at different times must compare equal.

impl PartialEq for Assertion {
    fn eq(&self, other: &Self) -> bool {
        self.subject_name == other.subject_name
            && self.subject_zone == other.subject_zone
            && self.context == other.context
            && self.content == other.content
            && self.signatures == other.signatures
    }
}

impl Eq for Assertion {}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "assertion {} in {} ({})",
            self.subject_name, self.subject_zone, self.context
        )
    }
}

//------------ Shard ---------------------------------------------------------

/// A signed lexicographic interval within a zone.
///
/// A shard enumerates every assertion of its zone whose subject name falls
/// within `[range_from, range_to]` and thereby proves the absence of any
/// other name in that interval. An empty bound is open on that side.
#[derive(Clone, Debug)]
pub struct Shard {
    /// The zone the shard belongs to.
    pub subject_zone: String,

    /// The context of the zone.
    pub context: String,

    /// Lower bound of the interval; empty means unbounded.
    pub range_from: String,

    /// Upper bound of the interval; empty means unbounded.
    pub range_to: String,

    /// All assertions within the interval.
    pub content: Vec<Assertion>,

    /// Signatures over the canonical encoding of the shard.
    pub signatures: Vec<Signature>,

    validity: Validity,
}

impl Shard {
    /// Creates an empty shard for the given interval.
    pub fn new(
        subject_zone: impl Into<String>,
        context: impl Into<String>,
        range_from: impl Into<String>,
        range_to: impl Into<String>,
    ) -> Self {
        Shard {
            subject_zone: subject_zone.into(),
            context: context.into(),
            range_from: range_from.into(),
            range_to: range_to.into(),
            content: Vec::new(),
            signatures: Vec::new(),
            validity: Validity::default(),
        }
    }

    /// Returns whether a subject name lies within the shard's interval.
    pub fn in_range(&self, subject_name: &str) -> bool {
        (self.range_from.is_empty()
            || subject_name >= self.range_from.as_str())
            && (self.range_to.is_empty()
                || subject_name <= self.range_to.as_str())
    }

    /// Sorts the contained assertions into the canonical order.
    pub fn sort(&mut self) {
        for assertion in &mut self.content {
            assertion.sort();
        }
        self.content.sort_by(Assertion::canonical_cmp);
    }

    /// The canonical comparator over shards.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.subject_zone
            .cmp(&other.subject_zone)
            .then_with(|| self.context.cmp(&other.context))
            .then_with(|| self.range_from.cmp(&other.range_from))
            .then_with(|| self.range_to.cmp(&other.range_to))
            .then_with(|| self.content.len().cmp(&other.content.len()))
            .then_with(|| {
                for (a, b) in self.content.iter().zip(&other.content) {
                    let ord = a.canonical_cmp(b);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            })
    }

    /// Widens the cached validity window, clamped to `now + max_validity`.
    pub fn update_validity(
        &mut self,
        since: i64,
        until: i64,
        max_validity: Duration,
        now: i64,
    ) {
        self.validity.update(since, until, max_validity, now);
    }

    /// The earliest time any verified signature makes this valid.
    pub fn valid_since(&self) -> i64 {
        self.validity.since
    }

    /// The latest time any verified signature keeps this valid.
    pub fn valid_until(&self) -> i64 {
        self.validity.until
    }
}

impl PartialEq for Shard {
    fn eq(&self, other: &Self) -> bool {
        self.subject_zone == other.subject_zone
            && self.context == other.context
            && self.range_from == other.range_from
            && self.range_to == other.range_to
            && self.content == other.content
            && self.signatures == other.signatures
    }
}

impl Eq for Shard {}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "shard [{}..{}] of {} ({})",
            self.range_from, self.range_to, self.subject_zone, self.context
        )
    }
}

//------------ Zone ----------------------------------------------------------

/// A signed enumeration of all assertions and shards of a zone.
#[derive(Clone, Debug)]
pub struct Zone {
    /// The zone being enumerated.
    pub subject_zone: String,

    /// The context of the zone.
    pub context: String,

    /// The assertions and shards comprising the zone.
    pub content: Vec<ZoneContent>,

    /// Signatures over the canonical encoding of the zone.
    pub signatures: Vec<Signature>,

    validity: Validity,
}

/// An element of a zone's content.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ZoneContent {
    /// A bare assertion.
    Assertion(Assertion),

    /// A shard of assertions.
    Shard(Shard),
}

impl Zone {
    /// Creates an empty zone.
    ///
    /// A zone containing nothing is structurally valid.
    pub fn new(
        subject_zone: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Zone {
            subject_zone: subject_zone.into(),
            context: context.into(),
            content: Vec::new(),
            signatures: Vec::new(),
            validity: Validity::default(),
        }
    }

    /// Sorts the content into the canonical order.
    ///
    /// Assertions order before shards, each group canonically.
    pub fn sort(&mut self) {
        for element in &mut self.content {
            match element {
                ZoneContent::Assertion(a) => a.sort(),
                ZoneContent::Shard(s) => s.sort(),
            }
        }
        self.content.sort_by(|a, b| match (a, b) {
            (ZoneContent::Assertion(a), ZoneContent::Assertion(b)) => {
                a.canonical_cmp(b)
            }
            (ZoneContent::Shard(a), ZoneContent::Shard(b)) => {
                a.canonical_cmp(b)
            }
            (ZoneContent::Assertion(_), ZoneContent::Shard(_)) => {
                Ordering::Less
            }
            (ZoneContent::Shard(_), ZoneContent::Assertion(_)) => {
                Ordering::Greater
            }
        });
    }

    /// Widens the cached validity window, clamped to `now + max_validity`.
    pub fn update_validity(
        &mut self,
        since: i64,
        until: i64,
        max_validity: Duration,
        now: i64,
    ) {
        self.validity.update(since, until, max_validity, now);
    }

    /// The earliest time any verified signature makes this valid.
    pub fn valid_since(&self) -> i64 {
        self.validity.since
    }

    /// The latest time any verified signature keeps this valid.
    pub fn valid_until(&self) -> i64 {
        self.validity.until
    }
}

impl PartialEq for Zone {
    fn eq(&self, other: &Self) -> bool {
        self.subject_zone == other.subject_zone
            && self.context == other.context
            && self.content == other.content
            && self.signatures == other.signatures
    }
}

impl Eq for Zone {}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "zone {} ({})", self.subject_zone, self.context)
    }
}

//------------ Query ---------------------------------------------------------

/// A question about a name in a context.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Query {
    /// The token the answer must carry.
    pub token: Token,

    /// The fully qualified name being asked about.
    pub name: String,

    /// The context to resolve the name in.
    pub context: String,

    /// The object types the querier is interested in.
    pub types: Vec<ObjectType>,

    /// The query is worthless at or after this time.
    pub expires: i64,

    /// Options expressing querier preferences.
    pub options: Vec<QueryOpt>,
}

impl Query {
    /// Creates a query for a name and a single object type.
    pub fn new(
        name: impl Into<String>,
        context: impl Into<String>,
        types: Vec<ObjectType>,
        expires: i64,
    ) -> Self {
        Query {
            token: Token::new(),
            name: name.into(),
            context: context.into(),
            types,
            expires,
            options: Vec::new(),
        }
    }

    /// Returns whether the query carries the given option.
    pub fn contains_option(&self, option: QueryOpt) -> bool {
        self.options.contains(&option)
    }

    /// Returns whether the query has expired at `now`.
    pub fn expired(&self, now: i64) -> bool {
        self.expires < now
    }

    /// Sorts types and options into the canonical order.
    pub fn sort(&mut self) {
        self.types.sort();
        self.options.sort();
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "query {} ({})", self.name, self.context)
    }
}

//------------ Notification --------------------------------------------------

/// A condition report about an earlier message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notification {
    /// The token of the message being reported about.
    pub token: Token,

    /// The kind of condition.
    pub kind: NotificationType,

    /// Optional free-form detail.
    pub data: String,
}

impl Notification {
    /// Creates a notification without detail data.
    pub fn new(token: Token, kind: NotificationType) -> Self {
        Notification {
            token,
            kind,
            data: String::new(),
        }
    }
}

//------------ AddrPrefix ----------------------------------------------------

/// An address prefix, the subject of the reverse tree.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct AddrPrefix {
    /// The network address.
    pub addr: IpAddr,

    /// The prefix length in bits.
    pub prefix_len: u8,
}

impl fmt::Display for AddrPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

//------------ AddressAssertion ----------------------------------------------

/// A signed statement about an address prefix.
#[derive(Clone, Debug)]
pub struct AddressAssertion {
    /// The address prefix the assertion speaks about.
    pub subject_addr: AddrPrefix,

    /// The context of the reverse tree.
    pub context: String,

    /// The typed objects bound to the prefix.
    pub content: Vec<Object>,

    /// Signatures over the canonical encoding.
    pub signatures: Vec<Signature>,

    validity: Validity,
}

impl AddressAssertion {
    /// Creates an empty address assertion.
    pub fn new(subject_addr: AddrPrefix, context: impl Into<String>) -> Self {
        AddressAssertion {
            subject_addr,
            context: context.into(),
            content: Vec::new(),
            signatures: Vec::new(),
            validity: Validity::default(),
        }
    }

    /// Sorts the content into the canonical order.
    pub fn sort(&mut self) {
        self.content.sort();
    }

    /// Widens the cached validity window, clamped to `now + max_validity`.
    pub fn update_validity(
        &mut self,
        since: i64,
        until: i64,
        max_validity: Duration,
        now: i64,
    ) {
        self.validity.update(since, until, max_validity, now);
    }

    /// The earliest time any verified signature makes this valid.
    pub fn valid_since(&self) -> i64 {
        self.validity.since
    }

    /// The latest time any verified signature keeps this valid.
    pub fn valid_until(&self) -> i64 {
        self.validity.until
    }
}

impl PartialEq for AddressAssertion {
    fn eq(&self, other: &Self) -> bool {
        self.subject_addr == other.subject_addr
            && self.context == other.context
            && self.content == other.content
            && self.signatures == other.signatures
    }
}

impl Eq for AddressAssertion {}

//------------ AddressZone ---------------------------------------------------

/// A signed enumeration of the address assertions below a prefix.
#[derive(Clone, Debug)]
pub struct AddressZone {
    /// The covering address prefix.
    pub subject_addr: AddrPrefix,

    /// The context of the reverse tree.
    pub context: String,

    /// The address assertions below the prefix.
    pub content: Vec<AddressAssertion>,

    /// Signatures over the canonical encoding.
    pub signatures: Vec<Signature>,

    validity: Validity,
}

impl AddressZone {
    /// Creates an empty address zone.
    pub fn new(subject_addr: AddrPrefix, context: impl Into<String>) -> Self {
        AddressZone {
            subject_addr,
            context: context.into(),
            content: Vec::new(),
            signatures: Vec::new(),
            validity: Validity::default(),
        }
    }

    /// Sorts the content into the canonical order.
    pub fn sort(&mut self) {
        for assertion in &mut self.content {
            assertion.sort();
        }
        self.content.sort_by(|a, b| {
            a.subject_addr
                .cmp(&b.subject_addr)
                .then_with(|| a.context.cmp(&b.context))
        });
    }

    /// Widens the cached validity window, clamped to `now + max_validity`.
    pub fn update_validity(
        &mut self,
        since: i64,
        until: i64,
        max_validity: Duration,
        now: i64,
    ) {
        self.validity.update(since, until, max_validity, now);
    }

    /// The earliest time any verified signature makes this valid.
    pub fn valid_since(&self) -> i64 {
        self.validity.since
    }

    /// The latest time any verified signature keeps this valid.
    pub fn valid_until(&self) -> i64 {
        self.validity.until
    }
}

impl PartialEq for AddressZone {
    fn eq(&self, other: &Self) -> bool {
        self.subject_addr == other.subject_addr
            && self.context == other.context
            && self.content == other.content
            && self.signatures == other.signatures
    }
}

impl Eq for AddressZone {}

//------------ AddressQuery --------------------------------------------------

/// A question about an address prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressQuery {
    /// The token the answer must carry.
    pub token: Token,

    /// The address prefix being asked about.
    pub subject_addr: AddrPrefix,

    /// The context of the reverse tree.
    pub context: String,

    /// The object types the querier is interested in.
    pub types: Vec<ObjectType>,

    /// The query is worthless at or after this time.
    pub expires: i64,

    /// Options expressing querier preferences.
    pub options: Vec<QueryOpt>,
}

impl AddressQuery {
    /// Returns whether the query carries the given option.
    pub fn contains_option(&self, option: QueryOpt) -> bool {
        self.options.contains(&option)
    }

    /// Returns whether the query has expired at `now`.
    pub fn expired(&self, now: i64) -> bool {
        self.expires < now
    }
}

//------------ Section -------------------------------------------------------

/// Any section a message may carry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Section {
    /// An assertion.
    Assertion(Assertion),

    /// A shard.
    Shard(Shard),

    /// A zone.
    Zone(Zone),

    /// A query.
    Query(Query),

    /// A notification.
    Notification(Notification),

    /// An address assertion.
    AddressAssertion(AddressAssertion),

    /// An address zone.
    AddressZone(AddressZone),

    /// An address query.
    AddressQuery(AddressQuery),
}

impl Section {
    /// A short name of the section kind for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Section::Assertion(_) => "assertion",
            Section::Shard(_) => "shard",
            Section::Zone(_) => "zone",
            Section::Query(_) => "query",
            Section::Notification(_) => "notification",
            Section::AddressAssertion(_) => "address-assertion",
            Section::AddressZone(_) => "address-zone",
            Section::AddressQuery(_) => "address-query",
        }
    }

    /// Converts into a signed section if this kind carries signatures.
    pub fn into_signed(self) -> Result<Signed, Section> {
        match self {
            Section::Assertion(a) => Ok(Signed::Assertion(a)),
            Section::Shard(s) => Ok(Signed::Shard(s)),
            Section::Zone(z) => Ok(Signed::Zone(z)),
            Section::AddressAssertion(a) => Ok(Signed::AddressAssertion(a)),
            Section::AddressZone(z) => Ok(Signed::AddressZone(z)),
            other => Err(other),
        }
    }
}

//--- From

impl From<Assertion> for Section {
    fn from(a: Assertion) -> Self {
        Section::Assertion(a)
    }
}

impl From<Shard> for Section {
    fn from(s: Shard) -> Self {
        Section::Shard(s)
    }
}

impl From<Zone> for Section {
    fn from(z: Zone) -> Self {
        Section::Zone(z)
    }
}

impl From<Query> for Section {
    fn from(q: Query) -> Self {
        Section::Query(q)
    }
}

impl From<Notification> for Section {
    fn from(n: Notification) -> Self {
        Section::Notification(n)
    }
}

impl From<Signed> for Section {
    fn from(signed: Signed) -> Self {
        match signed {
            Signed::Assertion(a) => Section::Assertion(a),
            Signed::Shard(s) => Section::Shard(s),
            Signed::Zone(z) => Section::Zone(z),
            Signed::AddressAssertion(a) => Section::AddressAssertion(a),
            Signed::AddressZone(z) => Section::AddressZone(z),
        }
    }
}

//------------ Signed --------------------------------------------------------

/// Any section that carries signatures.
///
/// This is the type the verifier and the stores operate on. It exposes the
/// capability surface shared by all signed kinds without resorting to a
/// trait-object hierarchy.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Signed {
    /// An assertion.
    Assertion(Assertion),

    /// A shard.
    Shard(Shard),

    /// A zone.
    Zone(Zone),

    /// An address assertion.
    AddressAssertion(AddressAssertion),

    /// An address zone.
    AddressZone(AddressZone),
}

impl Signed {
    /// The context of the section.
    pub fn context(&self) -> &str {
        match self {
            Signed::Assertion(a) => &a.context,
            Signed::Shard(s) => &s.context,
            Signed::Zone(z) => &z.context,
            Signed::AddressAssertion(a) => &a.context,
            Signed::AddressZone(z) => &z.context,
        }
    }

    /// The zone whose key signs the section.
    ///
    /// Address sections live in the reverse tree; their signing zone is
    /// derived from the context, with the global context mapping to the
    /// root zone.
    pub fn subject_zone(&self) -> String {
        match self {
            Signed::Assertion(a) => a.subject_zone.clone(),
            Signed::Shard(s) => s.subject_zone.clone(),
            Signed::Zone(z) => z.subject_zone.clone(),
            Signed::AddressAssertion(a) => address_zone(&a.context),
            Signed::AddressZone(z) => address_zone(&z.context),
        }
    }

    /// The signatures on the outer section.
    pub fn signatures(&self) -> &[Signature] {
        match self {
            Signed::Assertion(a) => &a.signatures,
            Signed::Shard(s) => &s.signatures,
            Signed::Zone(z) => &z.signatures,
            Signed::AddressAssertion(a) => &a.signatures,
            Signed::AddressZone(z) => &z.signatures,
        }
    }

    /// Mutable access to the signatures on the outer section.
    pub fn signatures_mut(&mut self) -> &mut Vec<Signature> {
        match self {
            Signed::Assertion(a) => &mut a.signatures,
            Signed::Shard(s) => &mut s.signatures,
            Signed::Zone(z) => &mut z.signatures,
            Signed::AddressAssertion(a) => &mut a.signatures,
            Signed::AddressZone(z) => &mut z.signatures,
        }
    }

    /// Sorts all content into the canonical order.
    pub fn sort(&mut self) {
        match self {
            Signed::Assertion(a) => a.sort(),
            Signed::Shard(s) => s.sort(),
            Signed::Zone(z) => z.sort(),
            Signed::AddressAssertion(a) => a.sort(),
            Signed::AddressZone(z) => z.sort(),
        }
    }

    /// Widens the cached validity window of the outer section.
    pub fn update_validity(
        &mut self,
        since: i64,
        until: i64,
        max_validity: Duration,
        now: i64,
    ) {
        match self {
            Signed::Assertion(a) => {
                a.update_validity(since, until, max_validity, now)
            }
            Signed::Shard(s) => {
                s.update_validity(since, until, max_validity, now)
            }
            Signed::Zone(z) => {
                z.update_validity(since, until, max_validity, now)
            }
            Signed::AddressAssertion(a) => {
                a.update_validity(since, until, max_validity, now)
            }
            Signed::AddressZone(z) => {
                z.update_validity(since, until, max_validity, now)
            }
        }
    }

    /// The earliest time any verified signature makes this valid.
    pub fn valid_since(&self) -> i64 {
        match self {
            Signed::Assertion(a) => a.valid_since(),
            Signed::Shard(s) => s.valid_since(),
            Signed::Zone(z) => z.valid_since(),
            Signed::AddressAssertion(a) => a.valid_since(),
            Signed::AddressZone(z) => z.valid_since(),
        }
    }

    /// The latest time any verified signature keeps this valid.
    pub fn valid_until(&self) -> i64 {
        match self {
            Signed::Assertion(a) => a.valid_until(),
            Signed::Shard(s) => s.valid_until(),
            Signed::Zone(z) => z.valid_until(),
            Signed::AddressAssertion(a) => a.valid_until(),
            Signed::AddressZone(z) => z.valid_until(),
        }
    }

    /// Returns whether no verified signature contributed a validity window.
    pub fn validity_window_empty(&self) -> bool {
        let validity = match self {
            Signed::Assertion(a) => a.validity,
            Signed::Shard(s) => s.validity,
            Signed::Zone(z) => z.validity,
            Signed::AddressAssertion(a) => a.validity,
            Signed::AddressZone(z) => z.validity,
        };
        validity.is_empty()
    }

    /// A short name of the section kind for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Signed::Assertion(_) => "assertion",
            Signed::Shard(_) => "shard",
            Signed::Zone(_) => "zone",
            Signed::AddressAssertion(_) => "address-assertion",
            Signed::AddressZone(_) => "address-zone",
        }
    }
}

impl fmt::Display for Signed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Signed::Assertion(a) => a.fmt(f),
            Signed::Shard(s) => s.fmt(f),
            Signed::Zone(z) => z.fmt(f),
            Signed::AddressAssertion(a) => {
                write!(f, "address-assertion {}", a.subject_addr)
            }
            Signed::AddressZone(z) => {
                write!(f, "address-zone {}", z.subject_addr)
            }
        }
    }
}

/// Derives the signing zone of an address section from its context.
fn address_zone(context: &str) -> String {
    if context == "." {
        ".".into()
    } else {
        match context.split_once("cx-") {
            Some((_, zone)) => zone.into(),
            None => ".".into(),
        }
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn fqdn_handles_root_zone() {
        assert_eq!(Assertion::new("ch", ".", ".").fqdn(), "ch");
        assert_eq!(Assertion::new("www", "ch", ".").fqdn(), "www.ch");
        assert_eq!(Assertion::new("@", "ch", ".").fqdn(), "ch");
        assert_eq!(Assertion::new("", "ch", ".").fqdn(), "ch");
    }

    #[test]
    fn shard_range_with_open_bounds() {
        let shard = Shard::new("ch", ".", "", "");
        assert!(shard.in_range("anything"));

        let shard = Shard::new("ch", ".", "a", "m");
        assert!(shard.in_range("a"));
        assert!(shard.in_range("m"));
        assert!(shard.in_range("def"));
        assert!(!shard.in_range("z"));

        let shard = Shard::new("ch", ".", "", "m");
        assert!(shard.in_range("a"));
        assert!(!shard.in_range("n"));
    }

    #[test]
    fn validity_update_widens_and_clamps() {
        let now = 1_000;
        let max = Duration::from_secs(600);
        let mut a = Assertion::new("www", "ch", ".");

        a.update_validity(now, now + 300, max, now);
        assert_eq!(a.valid_since(), now);
        assert_eq!(a.valid_until(), now + 300);

        // A wider window extends the cached one.
        a.update_validity(now - 100, now + 500, max, now);
        assert_eq!(a.valid_since(), now - 100);
        assert_eq!(a.valid_until(), now + 500);

        // But never beyond now + max.
        a.update_validity(now - 200, now + 100_000, max, now);
        assert_eq!(a.valid_until(), now + 600);
    }

    #[test]
    fn equality_ignores_cached_validity() {
        let mut a = Assertion::new("www", "ch", ".");
        let b = Assertion::new("www", "ch", ".");
        a.update_validity(0, 1_000, Duration::from_secs(600), 500);
        assert_eq!(a, b);
    }

    #[test]
    fn zone_sort_orders_assertions_before_shards() {
        let mut zone = Zone::new("ch", ".");
        zone.content
            .push(ZoneContent::Shard(Shard::new("ch", ".", "a", "m")));
        zone.content
            .push(ZoneContent::Assertion(Assertion::new("www", "ch", ".")));
        zone.sort();
        assert!(matches!(zone.content[0], ZoneContent::Assertion(_)));
        assert!(matches!(zone.content[1], ZoneContent::Shard(_)));
    }

    #[test]
    fn address_sections_derive_zone_from_context() {
        let prefix = AddrPrefix {
            addr: IpAddr::V4(Ipv4Addr::new(192, 0, 2, 0)),
            prefix_len: 24,
        };
        let global = Signed::AddressAssertion(AddressAssertion::new(
            prefix, ".",
        ));
        assert_eq!(global.subject_zone(), ".");

        let delegated = Signed::AddressAssertion(AddressAssertion::new(
            prefix, ".cx-example",
        ));
        assert_eq!(delegated.subject_zone(), "example");
    }
}
