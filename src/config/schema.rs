//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the node.
//! All types derive Serde traits for deserialization from config files.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for a node.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    /// Identity of this node.
    pub node: IdentityConfig,

    /// Peer transport settings (listener, handshake, reaper).
    pub transport: TransportConfig,

    /// Control plane (RPC) settings.
    pub control: ControlConfig,

    /// Discovery settings.
    pub discovery: DiscoveryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Node identity as provisioned in the config file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IdentityConfig {
    /// Stable node id. Generated on first start when left empty.
    pub id: String,

    /// Human readable name.
    pub display_name: String,
}

/// Transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Bind address for inbound peer connections (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent inbound connections (admission cap).
    pub max_connections: usize,

    /// Deadline for the whole authentication handshake, in seconds.
    pub handshake_timeout_secs: u64,

    /// Outbound dial timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Capacity of the shared inbound message queue.
    pub queue_capacity: usize,

    /// How often the reaper sweeps the connection table, in seconds.
    pub reap_interval_secs: u64,

    /// Idle time after which a connection is considered stale, in seconds.
    pub stale_after_secs: u64,

    /// Largest frame (one JSON line) in bytes. Also caps outgoing messages.
    pub max_frame_bytes: usize,

    /// Deadline for writing one message to a peer, in seconds.
    pub write_timeout_secs: u64,

    /// How long shutdown waits for connection handlers to exit, in seconds.
    pub drain_timeout_secs: u64,

    /// Hex-encoded pre-shared key. Peers must share it to authenticate.
    pub shared_secret: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 256,
            handshake_timeout_secs: 10,
            connect_timeout_secs: 5,
            queue_capacity: 100,
            reap_interval_secs: 30,
            stale_after_secs: 60,
            max_frame_bytes: 1024 * 1024,
            write_timeout_secs: 10,
            drain_timeout_secs: 5,
            shared_secret: None,
        }
    }
}

impl TransportConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Replace the port of `bind_address`, keeping its host part.
    pub fn set_port(&mut self, port: u16) {
        self.bind_address = replace_port(&self.bind_address, port);
    }
}

/// Control plane configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Enable the RPC server.
    pub enabled: bool,

    /// RPC server bind address.
    pub bind_address: String,

    /// Optional API key (Bearer token) required on `/rpc`.
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:9090".to_string(),
            api_key: None,
            request_timeout_secs: 30,
        }
    }
}

impl ControlConfig {
    /// Replace the port of `bind_address`, keeping its host part.
    pub fn set_port(&mut self, port: u16) {
        self.bind_address = replace_port(&self.bind_address, port);
    }
}

/// Discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Advertise this node and browse for others over mDNS.
    pub mdns_enabled: bool,

    /// Advertised service type, e.g. "_localp2p._tcp".
    pub service_name: String,

    /// Advertised domain. mDNS only serves "local.".
    pub domain: String,

    /// Time between browse rounds, in seconds.
    pub browse_interval_secs: u64,

    /// How long each browse round listens for answers, in seconds.
    pub browse_window_secs: u64,

    /// Announced peers not seen for this long are hidden, in seconds.
    pub peer_ttl_secs: u64,

    /// Peers known ahead of time.
    pub static_peers: Vec<StaticPeerConfig>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mdns_enabled: true,
            service_name: "_localp2p._tcp".to_string(),
            domain: "local.".to_string(),
            browse_interval_secs: 10,
            browse_window_secs: 5,
            peer_ttl_secs: 60,
            static_peers: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    /// Fully qualified service type, e.g. "_localp2p._tcp.local.".
    pub fn service_type(&self) -> String {
        let domain = self.domain.trim_matches('.');
        format!("{}.{}.", self.service_name.trim_end_matches('.'), domain)
    }

    pub fn peer_ttl(&self) -> Duration {
        Duration::from_secs(self.peer_ttl_secs)
    }

    pub fn browse_interval(&self) -> Duration {
        Duration::from_secs(self.browse_interval_secs)
    }

    pub fn browse_window(&self) -> Duration {
        Duration::from_secs(self.browse_window_secs)
    }
}

/// A statically configured peer candidate.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticPeerConfig {
    /// Peer id, if known. Defaults to "address:port".
    #[serde(default)]
    pub id: Option<String>,

    /// Display name.
    #[serde(default)]
    pub name: Option<String>,

    /// Host or IP address.
    pub address: String,

    /// Transport port.
    pub port: u16,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON instead of the human readable format.
    pub json_logs: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9100".to_string(),
        }
    }
}

fn replace_port(address: &str, port: u16) -> String {
    match address.parse::<SocketAddr>() {
        Ok(mut addr) => {
            addr.set_port(port);
            addr.to_string()
        }
        Err(_) => match address.rsplit_once(':') {
            Some((host, _)) => format!("{}:{}", host, port),
            None => format!("{}:{}", address, port),
        },
    }
}
