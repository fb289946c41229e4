//! Server configuration.
//!
//! Defaults suit a local development server; every field can be overridden
//! through `RGA_*` environment variables. Invalid values are logged and
//! ignored.

use std::net::SocketAddr;

use crate::crdt::ReplicaId;

pub const ENV_BIND_ADDR: &str = "RGA_BIND_ADDR";
pub const ENV_REPLICA_ID: &str = "RGA_REPLICA_ID";
pub const ENV_BROADCAST_CAPACITY: &str = "RGA_BROADCAST_CAPACITY";
/// Read by the binary to build its `EnvFilter`, defaults to `info`.
pub const ENV_LOG: &str = "RGA_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Prefix of the replica id of every document hosted by this server
    pub replica_id: ReplicaId,
    /// Messages buffered per document channel before a subscriber lags
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            replica_id: ReplicaId::from("server"),
            broadcast_capacity: 256,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        let mut config = ServerConfig::default();
        config.apply_overrides(std::env::vars());
        config
    }

    /// Applies `RGA_*` overrides from `vars`.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, raw) in vars {
            let value = raw.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                ENV_BIND_ADDR => match value.parse::<SocketAddr>() {
                    Ok(addr) => self.bind_addr = addr,
                    Err(err) => tracing::warn!("invalid {ENV_BIND_ADDR}, ignoring: {err}"),
                },
                ENV_REPLICA_ID => self.replica_id = ReplicaId::from(value),
                ENV_BROADCAST_CAPACITY => match value.parse::<usize>() {
                    Ok(capacity) if capacity > 0 => self.broadcast_capacity = capacity,
                    Ok(_) => tracing::warn!("{ENV_BROADCAST_CAPACITY} must be positive, ignoring"),
                    Err(err) => tracing::warn!("invalid {ENV_BROADCAST_CAPACITY}, ignoring: {err}"),
                },
                _ => {}
            }
        }
    }
}
