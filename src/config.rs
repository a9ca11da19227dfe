//! Server configuration.
//!
//! All knobs that affect the core live here: cache capacities, validity
//! bounds, worker pool sizing, the authoritative set, and where recursion
//! starts. The field names follow the JSON configuration file format of
//! the server, durations are in seconds.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

//------------ Config --------------------------------------------------------

/// Configuration of the verification and resolution core.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Config {
    /// Path of the root zone public key file pinned at startup.
    pub root_zone_public_key_path: PathBuf,

    /// Capacity of the zone-key cache.
    pub zone_key_cache_size: usize,

    /// High-water mark of the zone-key cache.
    pub zone_key_cache_warn_size: usize,

    /// Capacity of the infrastructure-key cache.
    pub infrastructure_key_cache_size: usize,

    /// Capacity of the external-key cache.
    pub external_key_cache_size: usize,

    /// Capacity of the pending-signature store.
    pub pending_signature_cache_size: usize,

    /// Capacity of the assertion store.
    pub assertion_cache_size: usize,

    /// Capacity of the negative-assertion (shard) store.
    pub negative_assertion_cache_size: usize,

    /// Maximum number of keys cached per (context, zone).
    pub max_public_keys_per_zone: usize,

    /// Upper bounds on stored section validity, per section kind.
    pub max_cache_validity: MaxCacheValidity,

    /// Upper bound on the lifetime of an outbound delegation query.
    pub delegation_query_validity: u64,

    /// Upper bound on the lifetime of an outbound query.
    pub query_validity: u64,

    /// Upper bound on the lifetime of an outbound address query.
    pub address_query_validity: u64,

    /// Interval of the verifier's cache sweep.
    pub reap_verify_timeout: u64,

    /// Interval of the engine's cache sweep.
    pub reap_engine_timeout: u64,

    /// Queue length of the priority worker pool.
    pub prio_buffer_size: usize,

    /// Queue length of the normal worker pool.
    pub normal_buffer_size: usize,

    /// Number of priority workers.
    pub prio_worker_count: usize,

    /// Number of normal workers.
    pub normal_worker_count: usize,

    /// Contexts this server is authoritative for, paired with
    /// `zone_authority` by position.
    pub context_authority: Vec<String>,

    /// Zones this server is authoritative for, paired with
    /// `context_authority` by position.
    pub zone_authority: Vec<String>,

    /// Inbound messages larger than this are rejected.
    pub max_msg_byte_length: usize,

    /// Capability URNs advertised by this server.
    pub capabilities: Vec<String>,

    /// The root name servers recursion starts from.
    pub root_name_servers: Vec<SocketAddr>,

    /// Forwarders queries are proxied to instead of recursing.
    pub forwarders: Vec<SocketAddr>,

    /// Timeout for a single resolver hop.
    pub dial_timeout: u64,

    /// Bound on redirect and name-alias composition depth.
    pub max_redirect_depth: usize,

    /// Where to send delegation queries for a (context, zone).
    pub delegation_authorities: Vec<DelegationAuthority>,
}

impl Config {
    /// Reads a configuration from a JSON file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read(path).map_err(ConfigError::Io)?;
        serde_json::from_slice(&data).map_err(ConfigError::Json)
    }

    /// The (context, zone) pairs this server is authoritative for.
    pub fn authorities(&self) -> HashSet<(String, String)> {
        self.context_authority
            .iter()
            .cloned()
            .zip(self.zone_authority.iter().cloned())
            .collect()
    }

    /// The upstream delegate to ask for a (context, zone) delegation.
    ///
    /// Falls back to the first root name server when the authoritative
    /// delegation table has no entry for the pair.
    pub fn delegation_address(
        &self,
        context: &str,
        zone: &str,
    ) -> Option<SocketAddr> {
        self.delegation_authorities
            .iter()
            .find(|entry| entry.context == context && entry.zone == zone)
            .map(|entry| entry.addr)
            .or_else(|| self.root_name_servers.first().copied())
    }

    /// The delegation query validity bound as a duration.
    pub fn delegation_query_validity(&self) -> Duration {
        Duration::from_secs(self.delegation_query_validity)
    }

    /// The query validity bound as a duration.
    pub fn query_validity(&self) -> Duration {
        Duration::from_secs(self.query_validity)
    }

    /// The verifier sweep interval as a duration.
    pub fn reap_verify_timeout(&self) -> Duration {
        Duration::from_secs(self.reap_verify_timeout)
    }

    /// The engine sweep interval as a duration.
    pub fn reap_engine_timeout(&self) -> Duration {
        Duration::from_secs(self.reap_engine_timeout)
    }

    /// The resolver hop timeout as a duration.
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root_zone_public_key_path: "rootZonePublicKey.json".into(),
            zone_key_cache_size: 1_000,
            zone_key_cache_warn_size: 750,
            infrastructure_key_cache_size: 10,
            external_key_cache_size: 5,
            pending_signature_cache_size: 1_000,
            assertion_cache_size: 10_000,
            negative_assertion_cache_size: 500,
            max_public_keys_per_zone: 5,
            max_cache_validity: MaxCacheValidity::default(),
            delegation_query_validity: 5,
            query_validity: 5,
            address_query_validity: 5,
            reap_verify_timeout: 1_800,
            reap_engine_timeout: 1_800,
            prio_buffer_size: 1_000,
            normal_buffer_size: 100_000,
            prio_worker_count: 2,
            normal_worker_count: 10,
            context_authority: Vec::new(),
            zone_authority: Vec::new(),
            max_msg_byte_length: 65_536,
            capabilities: vec![crate::wire::CAP_TLS_OVER_TCP.into()],
            root_name_servers: Vec::new(),
            forwarders: Vec::new(),
            dial_timeout: 10,
            max_redirect_depth: 8,
            delegation_authorities: Vec::new(),
        }
    }
}

//------------ MaxCacheValidity ----------------------------------------------

/// Upper bounds on how long a stored section may stay valid, in seconds.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct MaxCacheValidity {
    /// Bound for assertions.
    pub assertion_validity: u64,

    /// Bound for shards.
    pub shard_validity: u64,

    /// Bound for zones.
    pub zone_validity: u64,

    /// Bound for address assertions.
    pub address_assertion_validity: u64,

    /// Bound for address zones.
    pub address_zone_validity: u64,
}

impl MaxCacheValidity {
    /// The bound for assertions as a duration.
    pub fn assertion(&self) -> Duration {
        Duration::from_secs(self.assertion_validity)
    }

    /// The bound for shards as a duration.
    pub fn shard(&self) -> Duration {
        Duration::from_secs(self.shard_validity)
    }

    /// The bound for zones as a duration.
    pub fn zone(&self) -> Duration {
        Duration::from_secs(self.zone_validity)
    }

    /// The bound for address assertions as a duration.
    pub fn address_assertion(&self) -> Duration {
        Duration::from_secs(self.address_assertion_validity)
    }

    /// The bound for address zones as a duration.
    pub fn address_zone(&self) -> Duration {
        Duration::from_secs(self.address_zone_validity)
    }
}

impl Default for MaxCacheValidity {
    fn default() -> Self {
        MaxCacheValidity {
            assertion_validity: 86_400,
            shard_validity: 86_400,
            zone_validity: 86_400,
            address_assertion_validity: 86_400,
            address_zone_validity: 86_400,
        }
    }
}

//------------ DelegationAuthority -------------------------------------------

/// An entry of the authoritative delegation table.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DelegationAuthority {
    /// The context of the delegating zone.
    pub context: String,

    /// The delegating zone.
    pub zone: String,

    /// The server that can answer delegation queries for the pair.
    pub addr: SocketAddr,
}

//------------ ConfigError ---------------------------------------------------

/// An error loading the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),

    /// The file is not valid JSON of the expected shape.
    Json(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Io(err) => {
                write!(f, "cannot read configuration: {}", err)
            }
            ConfigError::Json(err) => {
                write!(f, "malformed configuration: {}", err)
            }
        }
    }
}

impl error::Error for ConfigError {}

//============ Testing =======================================================
