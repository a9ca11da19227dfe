//! The server core.
//!
//! [Core] gathers every piece of shared state: configuration, key stores,
//! the pending-signature store, engine, verifier, and resolver. All of it
//! is created once at startup and passed around explicitly; there are no
//! process-wide singletons.
//!
//! Inbound messages go through [Core::dispatch], which splits them into
//! sections and hands each to one of two bounded worker pools: a priority
//! pool for control-plane traffic (answers to our own delegation queries,
//! notifications) and a normal pool for everything else. When a queue is
//! full the message is dropped and the sender is told so, which is the
//! back-pressure mechanism of the server.
//!
//! Everything the core wants to say to the outside leaves through a
//! single outbound channel. The connection layer forwards
//! [Outbound::Message] values to peers; [Outbound::Ingest] values are
//! answers obtained by the resolver that re-enter [Core::dispatch] for
//! verification and caching, which [Core::handle_outbound] does for the
//! embedder.

use crate::base::codes::NotificationType;
use crate::base::section::{Notification, Section};
use crate::base::token::Token;
use crate::cache::keys::{load_root_anchor, AnchorError, KeyStores};
use crate::cache::pending::PendingSignatures;
use crate::cache::CacheError;
use crate::config::Config;
use crate::engine::Engine;
use crate::resolve::Resolver;
use crate::verify::Verifier;
use crate::wire::Message;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::error;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

//------------ Outbound ------------------------------------------------------

/// Something the core wants done outside of itself.
#[derive(Debug)]
pub enum Outbound {
    /// Deliver a message to a peer.
    Message {
        /// The peer to deliver to.
        dest: SocketAddr,

        /// The message to deliver.
        msg: Message,
    },

    /// Feed a resolver-obtained answer back into dispatch.
    Ingest {
        /// The answer message.
        msg: Message,

        /// The authority it came from.
        sender: SocketAddr,

        /// The (context, zone) that authority answers for, when the
        /// resolve walk could establish it.
        peer: Option<(String, String)>,
    },
}

//------------ WorkItem ------------------------------------------------------

/// One section on its way through a worker pool.
#[derive(Debug)]
struct WorkItem {
    section: Section,
    sender: SocketAddr,
    token: Token,
}

//------------ Core ----------------------------------------------------------

/// The shared state and machinery of a server.
#[derive(Debug)]
pub struct Core {
    config: Arc<Config>,

    /// The three public-key stores.
    pub keys: Arc<KeyStores>,

    /// Sections parked while their delegation key is fetched.
    pub pending: Arc<PendingSignatures>,

    /// The assertion store and query engine.
    pub engine: Arc<Engine>,

    /// The section verifier.
    pub verifier: Arc<Verifier>,

    /// The recursive resolver.
    pub resolver: Arc<Resolver>,

    active_tokens: Arc<Mutex<HashSet<Token>>>,
    prio_tx: mpsc::Sender<WorkItem>,
    normal_tx: mpsc::Sender<WorkItem>,
    prio_rx: Mutex<Option<mpsc::Receiver<WorkItem>>>,
    normal_rx: Mutex<Option<mpsc::Receiver<WorkItem>>>,
    out: mpsc::UnboundedSender<Outbound>,
    shutdown: watch::Sender<bool>,
}

impl Core {
    /// Creates the core from a configuration.
    ///
    /// Loads and pins the trust anchor and creates every cache; any
    /// failure here is fatal for the server. Returns the core and the
    /// receiving end of the outbound channel, which the connection layer
    /// must drain.
    pub fn new(
        config: Config,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<Outbound>), SetupError>
    {
        let config = Arc::new(config);
        let keys = Arc::new(KeyStores::new(&config)?);
        let anchor = load_root_anchor(&config.root_zone_public_key_path)?;
        keys.zone.pin(anchor);

        let pending = Arc::new(PendingSignatures::new(
            config.pending_signature_cache_size,
        )?);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let resolver = Arc::new(Resolver::from_config(&config));
        let engine = Arc::new(Engine::new(
            config.clone(),
            keys.clone(),
            Some(resolver.clone()),
            out_tx.clone(),
        )?);
        let active_tokens = Arc::new(Mutex::new(HashSet::new()));
        let verifier = Arc::new(Verifier::new(
            config.clone(),
            keys.clone(),
            pending.clone(),
            engine.clone(),
            out_tx.clone(),
            active_tokens.clone(),
        ));

        let (prio_tx, prio_rx) = mpsc::channel(config.prio_buffer_size);
        let (normal_tx, normal_rx) =
            mpsc::channel(config.normal_buffer_size);
        let (shutdown, _) = watch::channel(false);

        info!("server core initialized");
        let core = Arc::new(Core {
            config,
            keys,
            pending,
            engine,
            verifier,
            resolver,
            active_tokens,
            prio_tx,
            normal_tx,
            prio_rx: Mutex::new(Some(prio_rx)),
            normal_rx: Mutex::new(Some(normal_rx)),
            out: out_tx,
            shutdown,
        });
        Ok((core, out_rx))
    }

    /// Spawns the worker pools and reapers.
    ///
    /// The returned handles finish after [shutdown][Self::shutdown].
    pub fn run(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        if let Some(rx) = self.prio_rx.lock().take() {
            handles.extend(self.spawn_pool(
                rx,
                self.config.prio_worker_count,
            ));
        }
        if let Some(rx) = self.normal_rx.lock().take() {
            handles.extend(self.spawn_pool(
                rx,
                self.config.normal_worker_count,
            ));
        }
        handles.push(tokio::spawn(crate::verify::run_reaper(
            self.keys.clone(),
            self.pending.clone(),
            self.config.reap_verify_timeout(),
            self.shutdown.subscribe(),
        )));
        handles.push(tokio::spawn(crate::engine::run_reaper(
            self.engine.clone(),
            self.config.reap_engine_timeout(),
            self.shutdown.subscribe(),
        )));
        handles
    }

    /// Signals every spawned task to finish.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    fn spawn_pool(
        self: &Arc<Self>,
        rx: mpsc::Receiver<WorkItem>,
        workers: usize,
    ) -> Vec<JoinHandle<()>> {
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        (0..workers)
            .map(|_| {
                let rx = rx.clone();
                let core = self.clone();
                let mut shutdown = self.shutdown.subscribe();
                tokio::spawn(async move {
                    loop {
                        let item = {
                            let mut rx = rx.lock().await;
                            tokio::select! {
                                item = rx.recv() => item,
                                _ = shutdown.changed() => {
                                    if *shutdown.borrow() {
                                        return;
                                    }
                                    continue;
                                }
                            }
                        };
                        match item {
                            Some(item) => core.work(item),
                            None => return,
                        }
                    }
                })
            })
            .collect()
    }

    /// Processes one work item on a worker.
    fn work(&self, item: WorkItem) {
        match item.section {
            Section::Notification(note) => {
                self.handle_notification(note, item.sender)
            }
            section => {
                self.verifier.verify(section, item.sender, item.token)
            }
        }
    }

    /// Routes an inbound message into the worker pools.
    ///
    /// `peer` names the (context, zone) the sending server is known to
    /// speak for, which message-level signatures are checked against;
    /// the connection layer supplies it from connection metadata when it
    /// has any. Control-plane sections (answers to our own delegation
    /// queries, notifications) go to the priority pool. On queue
    /// overflow the section is dropped and the sender is notified,
    /// unless that notification cannot be delivered either.
    pub fn dispatch(
        &self,
        msg: Message,
        sender: SocketAddr,
        peer: Option<(&str, &str)>,
    ) {
        if !self.verifier.valid_message_signature(&msg, peer) {
            warn!(%sender, "dropping message with bad message signature");
            return;
        }

        // An answer to a query we proxied for someone else.
        if let Some(cache_answer) = self.engine.route_answer(&msg) {
            if !cache_answer {
                return;
            }
            // Fall through: the sections are verified and cached like
            // any other inbound data.
        }

        let token = msg.token;
        let own_query_answer = self.active_tokens.lock().remove(&token);
        for section in msg.content {
            let prio = own_query_answer
                || matches!(section, Section::Notification(_));
            let item = WorkItem {
                section,
                sender,
                token,
            };
            let queue = if prio { &self.prio_tx } else { &self.normal_tx };
            if queue.try_send(item).is_err() {
                warn!(%sender, prio, "worker queue full, shedding section");
                self.notify(
                    sender,
                    token,
                    NotificationType::ServerOverloaded,
                );
            }
        }
    }

    /// Sorts one outbound value for the embedder.
    ///
    /// Resolver-obtained answers re-enter dispatch here; everything else
    /// is returned for the connection layer to deliver.
    pub fn handle_outbound(
        &self,
        outbound: Outbound,
    ) -> Option<(SocketAddr, Message)> {
        match outbound {
            Outbound::Message { dest, msg } => Some((dest, msg)),
            Outbound::Ingest { msg, sender, peer } => {
                self.dispatch(
                    msg,
                    sender,
                    peer.as_ref().map(|(context, zone)| {
                        (context.as_str(), zone.as_str())
                    }),
                );
                None
            }
        }
    }

    fn handle_notification(&self, note: Notification, sender: SocketAddr) {
        match note.kind {
            NotificationType::Heartbeat => {
                debug!(%sender, token = %note.token, "heartbeat")
            }
            NotificationType::CapHashNotKnown => {
                // Re-advertising full capabilities is the connection
                // layer's job; log the request here.
                info!(%sender, "peer did not know our capability hash");
            }
            NotificationType::ServerOverloaded => {
                info!(%sender, "peer reports overload");
            }
            NotificationType::MsgTooLarge => {
                warn!(%sender, "peer rejected our message as too large");
            }
            NotificationType::NoAssertionAvail => {
                debug!(%sender, token = %note.token, "peer has no assertion");
            }
            kind => {
                debug!(%sender, %kind, data = %note.data, "notification");
            }
        }
    }

    fn notify(
        &self,
        dest: SocketAddr,
        token: Token,
        kind: NotificationType,
    ) {
        let msg = Message::with_content(
            Token::new(),
            vec![Section::Notification(Notification::new(token, kind))],
        );
        if self.out.send(Outbound::Message { dest, msg }).is_err() {
            debug!("outbound channel closed, dropping notification");
        }
    }
}

//------------ SetupError ----------------------------------------------------

/// A fatal error while bringing up the core.
#[derive(Debug)]
pub enum SetupError {
    /// A cache could not be created.
    Cache(CacheError),

    /// The trust anchor could not be loaded.
    Anchor(AnchorError),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SetupError::Cache(err) => err.fmt(f),
            SetupError::Anchor(err) => err.fmt(f),
        }
    }
}

impl error::Error for SetupError {}

impl From<CacheError> for SetupError {
    fn from(err: CacheError) -> Self {
        SetupError::Cache(err)
    }
}

impl From<AnchorError> for SetupError {
    fn from(err: AnchorError) -> Self {
        SetupError::Anchor(err)
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::codes::ObjectType;
    use crate::base::section::Query;
    use crate::base::unix_now;
    use std::time::Duration;

    fn write_anchor() -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "rains-server-anchor-{}-{:x}.json",
            std::process::id(),
            rand::random::<u64>()
        ));
        std::fs::write(
            &path,
            format!(
                r#"{{
                    "algorithm": "ed25519",
                    "keyphase": 0,
                    "valid_since": 0,
                    "valid_until": {},
                    "key": "{}"
                }}"#,
                unix_now() + 86_400,
                "00".repeat(32)
            ),
        )
        .unwrap();
        path
    }

    fn test_config() -> (Config, std::path::PathBuf) {
        let path = write_anchor();
        let config = Config {
            root_zone_public_key_path: path.clone(),
            ..Default::default()
        };
        (config, path)
    }

    #[tokio::test]
    async fn missing_anchor_is_fatal() {
        let config = Config {
            root_zone_public_key_path: "/nonexistent/anchor.json".into(),
            ..Default::default()
        };
        assert!(matches!(
            Core::new(config),
            Err(SetupError::Anchor(_))
        ));
    }

    #[tokio::test]
    async fn cached_answers_only_query_flows_through_the_pools() {
        let (config, path) = test_config();
        let (core, mut out_rx) = Core::new(config).unwrap();
        std::fs::remove_file(path).unwrap();
        let handles = core.run();

        let mut query = Query::new(
            "www.ch",
            ".",
            vec![ObjectType::Ip4],
            unix_now() + 60,
        );
        query
            .options
            .push(crate::base::codes::QueryOpt::CachedAnswersOnly);
        let token = query.token;
        let msg =
            Message::with_content(token, vec![Section::Query(query)]);
        let sender: SocketAddr = "192.0.2.7:4022".parse().unwrap();
        core.dispatch(msg, sender, None);

        let outbound = tokio::time::timeout(
            Duration::from_secs(5),
            out_rx.recv(),
        )
        .await
        .unwrap()
        .unwrap();
        match core.handle_outbound(outbound) {
            Some((dest, msg)) => {
                assert_eq!(dest, sender);
                match &msg.content[0] {
                    Section::Notification(note) => {
                        assert_eq!(note.token, token);
                        assert_eq!(
                            note.kind,
                            NotificationType::NoAssertionAvail
                        );
                    }
                    other => panic!("unexpected section: {:?}", other),
                }
            }
            None => panic!("expected a message for the peer"),
        }

        core.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn dispatch_checks_message_signatures_against_the_peer() {
        use crate::base::codes::{KeySpace, SigAlg};
        use crate::base::keys::{PublicKey, PublicKeyId, Signature};
        use ring::signature::{Ed25519KeyPair, KeyPair};

        let (config, path) = test_config();
        let (core, mut out_rx) = Core::new(config).unwrap();
        std::fs::remove_file(path).unwrap();
        let handles = core.run();

        // The infrastructure key of the peer server ns.ch.
        let rng = ring::rand::SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let infra = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
        let id = PublicKeyId {
            algorithm: SigAlg::Ed25519,
            key_space: KeySpace::Rains,
            key_phase: 0,
        };
        core.keys.infrastructure.install(PublicKey {
            id,
            valid_since: 0,
            valid_until: unix_now() + 600,
            context: ".".into(),
            zone: "ns.ch".into(),
            key: bytes::Bytes::copy_from_slice(
                infra.public_key().as_ref(),
            ),
        });

        let mut query = Query::new(
            "www.ch",
            ".",
            vec![ObjectType::Ip4],
            unix_now() + 60,
        );
        query
            .options
            .push(crate::base::codes::QueryOpt::CachedAnswersOnly);
        let token = query.token;
        let mut msg =
            Message::with_content(token, vec![Section::Query(query)]);
        let bytes = crate::wire::message_sig_bytes(&msg).unwrap();
        msg.signatures.push(Signature {
            id,
            valid_since: 0,
            valid_until: unix_now() + 600,
            data: bytes::Bytes::copy_from_slice(
                infra.sign(&bytes).as_ref(),
            ),
        });
        let sender: SocketAddr = "192.0.2.7:4022".parse().unwrap();

        // From an unidentified peer the signed message is dropped.
        core.dispatch(msg.clone(), sender, None);
        // With the peer identified it flows through to an answer.
        core.dispatch(msg, sender, Some((".", "ns.ch")));

        let outbound = tokio::time::timeout(
            Duration::from_secs(5),
            out_rx.recv(),
        )
        .await
        .unwrap()
        .unwrap();
        match core.handle_outbound(outbound) {
            Some((dest, msg)) => {
                assert_eq!(dest, sender);
                match &msg.content[0] {
                    Section::Notification(note) => {
                        assert_eq!(note.token, token);
                        assert_eq!(
                            note.kind,
                            NotificationType::NoAssertionAvail
                        );
                    }
                    other => panic!("unexpected section: {:?}", other),
                }
            }
            None => panic!("expected a message for the peer"),
        }
        // Only the identified dispatch produced anything.
        assert!(out_rx.try_recv().is_err());

        core.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn queue_overflow_sheds_with_notification() {
        let (mut config, path) = test_config();
        // No workers: the first section fills the queue, the second is
        // shed.
        config.normal_buffer_size = 1;
        config.normal_worker_count = 0;
        config.prio_worker_count = 0;
        let (core, mut out_rx) = Core::new(config).unwrap();
        std::fs::remove_file(path).unwrap();

        let sender: SocketAddr = "192.0.2.7:4022".parse().unwrap();
        for _ in 0..2 {
            let query = Query::new(
                "www.ch",
                ".",
                vec![ObjectType::Ip4],
                unix_now() + 60,
            );
            let msg = Message::with_content(
                query.token,
                vec![Section::Query(query.clone())],
            );
            core.dispatch(msg, sender, None);
        }

        let outbound = out_rx.try_recv().unwrap();
        match outbound {
            Outbound::Message { msg, .. } => match &msg.content[0] {
                Section::Notification(note) => assert_eq!(
                    note.kind,
                    NotificationType::ServerOverloaded
                ),
                other => panic!("unexpected section: {:?}", other),
            },
            other => panic!("unexpected outbound: {:?}", other),
        }
    }
}
