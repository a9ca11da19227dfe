//! The recursive resolver.
//!
//! Resolution starts at a configured set of root name servers. For every
//! query the resolver connects to the current authority, sends the query
//! under a fresh token, and waits for one message. The answer either
//! settles the query (an assertion matches the name on a requested type,
//! or a shard proves its absence), redirects the walk to another
//! authority, or is unusable, in which case the next root is tried. A
//! redirect is composed from the objects of the answer: the `redir`
//! target resolves through `srv` to a host and port, the host through
//! `ip4`/`ip6` to an address, with `name` aliases collapsed along the
//! way up to a bounded depth.
//!
//! Every delegation seen along a walk is remembered so later walks can
//! short-circuit, and so the connection pool's background readers can
//! answer delegation queries peers send us over the same connections.
//! The readers only ever answer from this cache; they never recurse on a
//! peer's behalf.

use crate::base::codes::ObjectType;
use crate::base::object::{NameAlias, Object, ServiceInfo};
use crate::base::section::{Assertion, Query, Section};
use crate::base::token::Token;
use crate::wire::{self, Message};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::error;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};

//------------ Configuration constants ---------------------------------------

/// The well-known RAINS transport port.
pub const RAINS_PORT: u16 = 55553;

/// The service-name prefix redirections point at.
const RAINS_SRV_PREFIX: &str = "_rains";

/// Default timeout for a single resolver hop.
const DEF_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on redirect and alias composition depth.
const DEF_REDIRECT_DEPTH: usize = 8;

/// Default size limit for messages read off pooled connections.
const DEF_MAX_MSG_LEN: usize = 65_536;

//------------ ResolutionMode ------------------------------------------------

/// How a resolver obtains answers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolutionMode {
    /// Walk the delegation tree from the roots.
    Recursive,

    /// Hand every query to a configured forwarder.
    Forward,
}

//------------ WalkState -----------------------------------------------------

/// The state of a single walk towards an authoritative answer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum WalkState {
    /// Nothing sent yet.
    Start,

    /// A query is outstanding at the current authority.
    WaitingForAnswer,

    /// The answer settled the query.
    Final,

    /// The answer pointed at another authority.
    Redirected,

    /// The walk cannot continue from this root.
    Abandoned,
}

//------------ Resolved ------------------------------------------------------

/// The outcome of a successful lookup.
#[derive(Debug)]
pub struct Resolved {
    /// The answer message.
    pub msg: Message,

    /// The peer that produced the answer.
    pub from: SocketAddr,

    /// The (context, zone) the answering peer is authoritative for,
    /// when the walk could establish it. A recursive walk knows it from
    /// the redirect that led to the final authority; a forwarder or a
    /// cache hit does not identify an authority.
    pub peer: Option<(String, String)>,
}

//------------ Resolver ------------------------------------------------------

/// A recursive resolver with a connection pool.
#[derive(Debug)]
pub struct Resolver {
    roots: Vec<SocketAddr>,
    forwarders: Vec<SocketAddr>,
    mode: ResolutionMode,
    dial_timeout: Duration,
    max_redirect_depth: usize,
    max_msg_len: usize,
    delegations: Arc<Mutex<HashMap<String, Arc<Assertion>>>>,
    pool: ConnPool,
}

impl Resolver {
    /// Creates a resolver with default settings.
    pub fn new(
        roots: Vec<SocketAddr>,
        forwarders: Vec<SocketAddr>,
        mode: ResolutionMode,
    ) -> Self {
        Resolver {
            roots,
            forwarders,
            mode,
            dial_timeout: DEF_DIAL_TIMEOUT,
            max_redirect_depth: DEF_REDIRECT_DEPTH,
            max_msg_len: DEF_MAX_MSG_LEN,
            delegations: Arc::new(Mutex::new(HashMap::new())),
            pool: ConnPool::new(),
        }
    }

    /// Creates a resolver from the server configuration.
    pub fn from_config(config: &crate::config::Config) -> Self {
        let mode = if config.forwarders.is_empty() {
            ResolutionMode::Recursive
        } else {
            ResolutionMode::Forward
        };
        let mut resolver = Self::new(
            config.root_name_servers.clone(),
            config.forwarders.clone(),
            mode,
        );
        resolver.dial_timeout = config.dial_timeout();
        resolver.max_redirect_depth = config.max_redirect_depth;
        resolver.max_msg_len = config.max_msg_byte_length;
        resolver
    }

    /// Sets the per-hop timeout.
    pub fn set_dial_timeout(&mut self, dial_timeout: Duration) {
        self.dial_timeout = dial_timeout;
    }

    /// Returns the cached delegation assertion for a name.
    pub fn cached_delegation(&self, name: &str) -> Option<Arc<Assertion>> {
        self.delegations.lock().get(name).cloned()
    }

    /// Resolves a query, returning the answer and who produced it.
    pub async fn client_lookup(
        &self,
        query: &Query,
    ) -> Result<Resolved, ResolveError> {
        match self.mode {
            ResolutionMode::Recursive => self.recursive_resolve(query).await,
            ResolutionMode::Forward => self.forward_query(query).await,
        }
    }

    /// Resolves a query on behalf of a peer and answers it directly.
    ///
    /// The answer is written back through the connection pool under the
    /// peer's original token.
    pub async fn server_lookup(
        &self,
        query: &Query,
        dest: SocketAddr,
        token: Token,
    ) {
        let answer = match self.client_lookup(query).await {
            Ok(resolved) => resolved.msg,
            Err(err) => {
                warn!(%err, %query, "server lookup failed");
                return;
            }
        };
        let mut answer = answer;
        answer.token = token;
        if let Err(err) = self.pool.send(dest, &answer, self).await {
            warn!(%err, %dest, "cannot answer peer");
        }
    }

    //--- The walk

    async fn recursive_resolve(
        &self,
        query: &Query,
    ) -> Result<Resolved, ResolveError> {
        // Delegation shortcut: a cached delegation assertion settles a
        // delegation query without a walk.
        if query.types.contains(&ObjectType::Delegation) {
            if let Some(assertion) =
                self.delegations.lock().get(&query.name).cloned()
            {
                debug!(name = %query.name, "cached delegation answers query");
                let msg = Message::with_content(
                    Token::new(),
                    vec![Section::Assertion((*assertion).clone())],
                );
                return Ok(Resolved {
                    msg,
                    from: unspecified_addr(),
                    peer: None,
                });
            }
        }

        for root in &self.roots {
            let mut authority = *root;
            let mut authority_zone = String::from(".");
            let mut state = WalkState::Start;
            loop {
                debug!(?state, %authority, name = %query.name, "walk hop");
                state = WalkState::WaitingForAnswer;
                let mut hop_query = query.clone();
                hop_query.token = Token::new();
                let msg = Message::with_content(
                    hop_query.token,
                    vec![Section::Query(hop_query)],
                );
                let answer = match self.send_query(authority, msg).await {
                    Ok(answer) => answer,
                    Err(err) => {
                        debug!(%err, %authority, "hop failed");
                        break;
                    }
                };
                if answer.content.is_empty() {
                    break;
                }
                match self.classify(&answer, query) {
                    Outcome::Final => {
                        state = WalkState::Final;
                        debug!(?state, %authority, "walk settled");
                        return Ok(Resolved {
                            msg: answer,
                            from: authority,
                            peer: Some((
                                query.context.clone(),
                                authority_zone,
                            )),
                        });
                    }
                    Outcome::Redirect(info) => {
                        match self.compose_redirect(&info) {
                            Some((next, zone)) => {
                                state = WalkState::Redirected;
                                debug!(?state, %next, "following redirect");
                                authority = next;
                                authority_zone = zone;
                            }
                            None => {
                                state = WalkState::Abandoned;
                                debug!(
                                    ?state,
                                    "redirect did not end in an address"
                                );
                                break;
                            }
                        }
                    }
                    Outcome::Unexpected => {
                        state = WalkState::Abandoned;
                        warn!(
                            ?state,
                            %authority,
                            "unexpected answer, abandoning this root"
                        );
                        break;
                    }
                }
            }
        }
        Err(ResolveError::NoAnswer)
    }

    async fn forward_query(
        &self,
        query: &Query,
    ) -> Result<Resolved, ResolveError> {
        if self.forwarders.is_empty() {
            return Err(ResolveError::NoForwarders);
        }
        for forwarder in &self.forwarders {
            let mut forwarded = query.clone();
            forwarded.token = Token::new();
            let msg = Message::with_content(
                forwarded.token,
                vec![Section::Query(forwarded)],
            );
            match self.send_query(*forwarder, msg).await {
                Ok(answer) => {
                    return Ok(Resolved {
                        msg: answer,
                        from: *forwarder,
                        peer: None,
                    })
                }
                Err(err) => {
                    debug!(%err, %forwarder, "forwarder failed")
                }
            }
        }
        Err(ResolveError::NoAnswer)
    }

    /// Sends a message and awaits the answer matching its token.
    async fn send_query(
        &self,
        dest: SocketAddr,
        msg: Message,
    ) -> Result<Message, ResolveError> {
        let handle = self.pool.get_or_connect(dest, self).await?;
        let (tx, rx) = oneshot::channel();
        handle.pending.lock().insert(msg.token, tx);
        if let Err(err) = handle.write(&msg).await {
            // A dead pooled connection is closed and retried once on a
            // fresh one.
            debug!(%err, %dest, "write failed, retrying on a fresh connection");
            handle.pending.lock().remove(&msg.token);
            self.pool.close(dest).await;
            let handle = self.pool.get_or_connect(dest, self).await?;
            let (tx, new_rx) = oneshot::channel();
            handle.pending.lock().insert(msg.token, tx);
            handle.write(&msg).await?;
            return self.await_answer(&handle, msg.token, new_rx).await;
        }
        self.await_answer(&handle, msg.token, rx).await
    }

    async fn await_answer(
        &self,
        handle: &ConnHandle,
        token: Token,
        rx: oneshot::Receiver<Message>,
    ) -> Result<Message, ResolveError> {
        match timeout(self.dial_timeout, rx).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(_)) => {
                handle.pending.lock().remove(&token);
                Err(ResolveError::ConnectionClosed)
            }
            Err(_) => {
                handle.pending.lock().remove(&token);
                Err(ResolveError::Timeout)
            }
        }
    }

    //--- Answer classification

    fn classify(&self, msg: &Message, query: &Query) -> Outcome {
        let mut info = RedirectInfo::default();
        let mut is_final = false;
        let mut is_redir = false;
        for section in &msg.content {
            match section {
                Section::Assertion(assertion) => self.scan_assertion(
                    assertion,
                    query,
                    &mut info,
                    &mut is_final,
                    &mut is_redir,
                ),
                Section::Shard(shard) => {
                    if let Some(rest) =
                        query.name.strip_suffix(&shard.subject_zone)
                    {
                        let rest = rest.trim_end_matches('.');
                        if shard.in_range(rest) {
                            is_final = true;
                        }
                    }
                }
                Section::Zone(zone) => {
                    for element in &zone.content {
                        if let crate::base::section::ZoneContent::Assertion(
                            assertion,
                        ) = element
                        {
                            self.scan_assertion(
                                assertion,
                                query,
                                &mut info,
                                &mut is_final,
                                &mut is_redir,
                            );
                        }
                    }
                    if query.name.ends_with(&zone.subject_zone) {
                        is_final = true;
                    }
                }
                _ => {}
            }
        }
        if is_final {
            Outcome::Final
        } else if is_redir {
            Outcome::Redirect(info)
        } else {
            Outcome::Unexpected
        }
    }

    fn scan_assertion(
        &self,
        assertion: &Assertion,
        query: &Query,
        info: &mut RedirectInfo,
        is_final: &mut bool,
        is_redir: &mut bool,
    ) {
        let fqdn = assertion.fqdn();
        for object in &assertion.content {
            match object {
                Object::Redirection(target) => {
                    info.redirs.push((fqdn.clone(), target.clone()));
                    if !query.types.contains(&ObjectType::Redirection)
                        || fqdn != query.name
                    {
                        *is_redir = true;
                    }
                }
                Object::Delegation(_) => {
                    self.delegations
                        .lock()
                        .insert(fqdn.clone(), Arc::new(assertion.clone()));
                    info!(name = %fqdn, "cached delegation");
                }
                Object::ServiceInfo(srv) => {
                    info.srv.insert(fqdn.clone(), srv.clone());
                }
                Object::Ip4(addr) => {
                    info.ip.insert(fqdn.clone(), IpAddr::V4(*addr));
                }
                Object::Ip6(addr) => {
                    info.ip.insert(fqdn.clone(), IpAddr::V6(*addr));
                }
                Object::Name(alias) => {
                    info.names.insert(fqdn.clone(), alias.clone());
                }
                _ => {}
            }
            if query.types.contains(&object.kind()) && fqdn == query.name {
                *is_final = true;
            }
        }
    }

    /// Composes the next authority address from redirect information.
    ///
    /// Returns the address together with the zone whose redirection led
    /// there, which is what the next authority is authoritative for.
    fn compose_redirect(
        &self,
        info: &RedirectInfo,
    ) -> Option<(SocketAddr, String)> {
        for (source, target) in &info.redirs {
            if let Some(addr) = self.follow_redirect(
                target,
                info,
                Allowed::all(),
                self.max_redirect_depth,
            ) {
                return Some((addr, source.clone()));
            }
        }
        None
    }

    /// Resolves a redirect target to an address.
    ///
    /// `redir` names resolve through `srv` to host and port and through
    /// `ip` to an address; `name` aliases restart the search under the
    /// alias with its allowed types. Recursion is bounded by `depth`.
    fn follow_redirect(
        &self,
        name: &str,
        info: &RedirectInfo,
        allowed: Allowed,
        depth: usize,
    ) -> Option<SocketAddr> {
        if depth == 0 {
            debug!(name, "redirect composition exceeded depth bound");
            return None;
        }
        if allowed.ip {
            if let Some(addr) = info.ip.get(name) {
                return Some(SocketAddr::new(*addr, RAINS_PORT));
            }
        }
        if allowed.srv && name.starts_with(RAINS_SRV_PREFIX) {
            if let Some(srv) = info.srv.get(name) {
                if let Some(addr) = self.follow_redirect(
                    &srv.name,
                    info,
                    Allowed::addr_only(),
                    depth - 1,
                ) {
                    return Some(SocketAddr::new(addr.ip(), srv.port));
                }
            }
        }
        if allowed.name {
            if let Some(alias) = info.names.get(name) {
                let allowed = Allowed::from_types(&alias.types);
                return self.follow_redirect(
                    &alias.name,
                    info,
                    allowed,
                    depth - 1,
                );
            }
        }
        None
    }

}

//------------ RedirectInfo --------------------------------------------------

/// The redirect-relevant objects of one answer.
#[derive(Debug, Default)]
struct RedirectInfo {
    /// (redirecting zone, target service name) pairs.
    redirs: Vec<(String, String)>,
    srv: HashMap<String, ServiceInfo>,
    ip: HashMap<String, IpAddr>,
    names: HashMap<String, NameAlias>,
}

/// The outcome of classifying an answer.
enum Outcome {
    Final,
    Redirect(RedirectInfo),
    Unexpected,
}

/// Which object types a redirect step may be resolved through.
#[derive(Clone, Copy, Debug)]
struct Allowed {
    ip: bool,
    srv: bool,
    name: bool,
}

impl Allowed {
    fn all() -> Self {
        Allowed {
            ip: true,
            srv: true,
            name: true,
        }
    }

    fn addr_only() -> Self {
        Allowed {
            ip: true,
            srv: false,
            name: false,
        }
    }

    fn from_types(types: &[ObjectType]) -> Self {
        Allowed {
            ip: types.contains(&ObjectType::Ip4)
                || types.contains(&ObjectType::Ip6),
            srv: types.contains(&ObjectType::ServiceInfo),
            name: types.contains(&ObjectType::Name),
        }
    }
}

fn unspecified_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
}

//------------ ConnPool ------------------------------------------------------

/// Live connections to peers, keyed by address.
#[derive(Debug)]
struct ConnPool {
    conns: Arc<tokio::sync::Mutex<HashMap<SocketAddr, ConnHandle>>>,
}

/// The writer half and response routing of one pooled connection.
#[derive(Clone, Debug)]
struct ConnHandle {
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    pending: Arc<Mutex<HashMap<Token, oneshot::Sender<Message>>>>,
}

impl ConnHandle {
    async fn write(&self, msg: &Message) -> Result<(), ResolveError> {
        let mut writer = self.writer.lock().await;
        wire::write_message(&mut *writer, msg)
            .await
            .map_err(ResolveError::Wire)
    }
}

impl ConnPool {
    fn new() -> Self {
        ConnPool {
            conns: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Returns the pooled connection to `dest`, opening one on a miss.
    ///
    /// A new connection gets a background reader that routes answers to
    /// the queries awaiting them and answers inbound delegation queries
    /// from the resolver's delegation cache.
    async fn get_or_connect(
        &self,
        dest: SocketAddr,
        resolver: &Resolver,
    ) -> Result<ConnHandle, ResolveError> {
        let mut conns = self.conns.lock().await;
        if let Some(handle) = conns.get(&dest) {
            return Ok(handle.clone());
        }
        let stream =
            match timeout(resolver.dial_timeout, TcpStream::connect(dest))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(err)) => return Err(ResolveError::Io(err)),
                Err(_) => return Err(ResolveError::Timeout),
            };
        let (read_half, write_half) = stream.into_split();
        let handle = ConnHandle {
            writer: Arc::new(tokio::sync::Mutex::new(write_half)),
            pending: Arc::new(Mutex::new(HashMap::new())),
        };
        conns.insert(dest, handle.clone());
        tokio::spawn(read_loop(
            dest,
            read_half,
            handle.clone(),
            resolver.delegations.clone(),
            self.conns.clone(),
            resolver.max_msg_len,
        ));
        debug!(%dest, "opened pooled connection");
        Ok(handle)
    }

    /// Closes and forgets the connection to `dest`.
    async fn close(&self, dest: SocketAddr) {
        self.conns.lock().await.remove(&dest);
    }

    /// Sends a message over the pooled connection to `dest`.
    ///
    /// Opens a connection on a miss; a write error closes the connection
    /// and retries once on a fresh one.
    async fn send(
        &self,
        dest: SocketAddr,
        msg: &Message,
        resolver: &Resolver,
    ) -> Result<(), ResolveError> {
        let handle = self.get_or_connect(dest, resolver).await?;
        if let Err(err) = handle.write(msg).await {
            debug!(%err, %dest, "write failed, retrying on a fresh connection");
            self.close(dest).await;
            let handle = self.get_or_connect(dest, resolver).await?;
            return handle.write(msg).await;
        }
        Ok(())
    }
}

/// Reads one pooled connection until it dies.
async fn read_loop(
    dest: SocketAddr,
    mut read_half: OwnedReadHalf,
    handle: ConnHandle,
    delegations: Arc<Mutex<HashMap<String, Arc<Assertion>>>>,
    conns: Arc<tokio::sync::Mutex<HashMap<SocketAddr, ConnHandle>>>,
    max_msg_len: usize,
) {
    loop {
        let msg = match wire::read_message(&mut read_half, max_msg_len).await
        {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%err, %dest, "pooled connection closed");
                break;
            }
        };
        let is_query = msg
            .content
            .iter()
            .any(|section| matches!(section, Section::Query(_)));
        if is_query {
            // A peer asking us for delegations; answer from the cache
            // only, never recurse on a peer's behalf.
            let mut answer = Vec::new();
            {
                let delegations = delegations.lock();
                for section in &msg.content {
                    if let Section::Query(query) = section {
                        if !query
                            .types
                            .contains(&ObjectType::Delegation)
                        {
                            continue;
                        }
                        if let Some(assertion) =
                            delegations.get(&query.name)
                        {
                            answer.push(Section::Assertion(
                                (**assertion).clone(),
                            ));
                        }
                    }
                }
            }
            let reply = Message::with_content(msg.token, answer);
            if handle.write(&reply).await.is_err() {
                break;
            }
            continue;
        }
        let waiter = handle.pending.lock().remove(&msg.token);
        match waiter {
            Some(tx) => {
                let _ = tx.send(msg);
            }
            None => {
                debug!(%dest, token = %msg.token, "answer without a waiter");
            }
        }
    }
    conns.lock().await.remove(&dest);
    // Dropping the pending map wakes every waiter with an error.
    handle.pending.lock().clear();
}

//------------ ResolveError --------------------------------------------------

/// An error during resolution.
#[derive(Debug)]
pub enum ResolveError {
    /// All roots were tried without a final answer.
    NoAnswer,

    /// Forward mode without configured forwarders.
    NoForwarders,

    /// A hop did not answer within the dial timeout.
    Timeout,

    /// The connection died while waiting for an answer.
    ConnectionClosed,

    /// Connecting to a peer failed.
    Io(std::io::Error),

    /// Encoding or decoding a message failed.
    Wire(wire::WireError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResolveError::NoAnswer => {
                write!(f, "no answer obtainable through a recursive lookup")
            }
            ResolveError::NoForwarders => {
                write!(f, "forward mode requires configured forwarders")
            }
            ResolveError::Timeout => write!(f, "peer did not answer in time"),
            ResolveError::ConnectionClosed => {
                write!(f, "connection closed while awaiting an answer")
            }
            ResolveError::Io(err) => write!(f, "connection failed: {}", err),
            ResolveError::Wire(err) => err.fmt(f),
        }
    }
}

impl error::Error for ResolveError {}

impl From<wire::WireError> for ResolveError {
    fn from(err: wire::WireError) -> Self {
        ResolveError::Wire(err)
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::unix_now;
    use tokio::net::TcpListener;

    fn ip4_assertion(name: &str, zone: &str, addr: [u8; 4]) -> Assertion {
        let mut a = Assertion::new(name, zone, ".");
        a.content.push(Object::Ip4(addr.into()));
        a
    }

    #[test]
    fn alias_loops_are_bounded() {
        let resolver =
            Resolver::new(Vec::new(), Vec::new(), ResolutionMode::Recursive);
        let mut info = RedirectInfo::default();
        info.names.insert(
            "a.ch".into(),
            NameAlias {
                name: "b.ch".into(),
                types: vec![ObjectType::Name],
            },
        );
        info.names.insert(
            "b.ch".into(),
            NameAlias {
                name: "a.ch".into(),
                types: vec![ObjectType::Name],
            },
        );
        assert!(resolver
            .follow_redirect("a.ch", &info, Allowed::all(), 8)
            .is_none());
    }

    #[test]
    fn classification_distinguishes_outcomes() {
        let resolver =
            Resolver::new(Vec::new(), Vec::new(), ResolutionMode::Recursive);
        let query = Query::new(
            "www.ch",
            ".",
            vec![ObjectType::Ip4],
            unix_now() + 60,
        );

        // A matching assertion is final.
        let final_msg = Message::with_content(
            Token::new(),
            vec![Section::Assertion(ip4_assertion(
                "www",
                "ch",
                [192, 0, 2, 1],
            ))],
        );
        assert!(matches!(
            resolver.classify(&final_msg, &query),
            Outcome::Final
        ));

        // A redirection for an ancestor redirects the walk.
        let mut redir = Assertion::new("ch", ".", ".");
        redir
            .content
            .push(Object::Redirection("_rains._tcp.ch".into()));
        let redir_msg = Message::with_content(
            Token::new(),
            vec![Section::Assertion(redir)],
        );
        assert!(matches!(
            resolver.classify(&redir_msg, &query),
            Outcome::Redirect(_)
        ));

        // Unrelated content is unusable.
        let unrelated = Message::with_content(
            Token::new(),
            vec![Section::Assertion(ip4_assertion(
                "mail",
                "ee",
                [192, 0, 2, 9],
            ))],
        );
        assert!(matches!(
            resolver.classify(&unrelated, &query),
            Outcome::Unexpected
        ));
    }

    #[test]
    fn covering_shard_is_final() {
        let resolver =
            Resolver::new(Vec::new(), Vec::new(), ResolutionMode::Recursive);
        let query = Query::new(
            "def.ch",
            ".",
            vec![ObjectType::Ip4],
            unix_now() + 60,
        );
        let shard = crate::base::section::Shard::new("ch", ".", "a", "m");
        let msg = Message::with_content(
            Token::new(),
            vec![Section::Shard(shard)],
        );
        assert!(matches!(resolver.classify(&msg, &query), Outcome::Final));
    }

    #[tokio::test]
    async fn walk_follows_redirect_to_final_answer() {
        // The authoritative server for ch.
        let auth_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let auth_addr = auth_listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = auth_listener.accept().await.unwrap();
            let msg = wire::read_message(&mut stream, 1 << 16)
                .await
                .unwrap();
            let answer = Message::with_content(
                msg.token,
                vec![Section::Assertion(ip4_assertion(
                    "www",
                    "ch",
                    [192, 0, 2, 80],
                ))],
            );
            wire::write_message(&mut stream, &answer).await.unwrap();
            // Hold the connection open until the test is done.
            let _ = wire::read_message(&mut stream, 1 << 16).await;
        });

        // The root redirects ch to the authoritative server and also
        // hands out the delegation for ch.
        let root_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let root_addr = root_listener.local_addr().unwrap();
        let auth_port = auth_addr.port();
        tokio::spawn(async move {
            let (mut stream, _) = root_listener.accept().await.unwrap();
            let msg = wire::read_message(&mut stream, 1 << 16)
                .await
                .unwrap();

            let mut redir = Assertion::new("ch", ".", ".");
            redir
                .content
                .push(Object::Redirection("_rains._tcp.ch".into()));
            redir.content.push(crate::base::object::delegation(
                crate::base::codes::SigAlg::Ed25519,
                1,
                0,
                unix_now() + 600,
                bytes::Bytes::from(vec![1u8; 32]),
            ));
            let mut srv = Assertion::new("_rains._tcp", "ch", ".");
            srv.content.push(Object::ServiceInfo(ServiceInfo {
                name: "ns.ch".into(),
                port: auth_port,
                priority: 0,
            }));
            let answer = Message::with_content(
                msg.token,
                vec![
                    Section::Assertion(redir),
                    Section::Assertion(srv),
                    Section::Assertion(ip4_assertion(
                        "ns",
                        "ch",
                        [127, 0, 0, 1],
                    )),
                ],
            );
            wire::write_message(&mut stream, &answer).await.unwrap();
            let _ = wire::read_message(&mut stream, 1 << 16).await;
        });

        let mut resolver = Resolver::new(
            vec![root_addr],
            Vec::new(),
            ResolutionMode::Recursive,
        );
        resolver.set_dial_timeout(Duration::from_secs(5));

        let query = Query::new(
            "www.ch",
            ".",
            vec![ObjectType::Ip4],
            unix_now() + 60,
        );
        let resolved = resolver.client_lookup(&query).await.unwrap();
        assert_eq!(resolved.from, auth_addr);
        assert!(resolved
            .msg
            .content
            .iter()
            .any(|s| matches!(s, Section::Assertion(a)
                if a.subject_name == "www")));
        // The final authority is known to answer for (., ch).
        assert_eq!(
            resolved.peer,
            Some((".".to_string(), "ch".to_string()))
        );

        // The walk cached the delegation for ch as a side effect.
        assert!(resolver.cached_delegation("ch").is_some());
    }

    #[tokio::test]
    async fn exhausted_roots_yield_no_answer() {
        // A root that immediately closes the connection.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut resolver = Resolver::new(
            vec![addr],
            Vec::new(),
            ResolutionMode::Recursive,
        );
        resolver.set_dial_timeout(Duration::from_millis(500));
        let query = Query::new(
            "www.ch",
            ".",
            vec![ObjectType::Ip4],
            unix_now() + 60,
        );
        assert!(matches!(
            resolver.client_lookup(&query).await,
            Err(ResolveError::NoAnswer)
        ));
    }
}
