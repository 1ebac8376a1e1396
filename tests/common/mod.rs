//! Shared utilities for integration tests.

use std::future::Future;
use std::time::Duration;

use localp2p::config::{NodeConfig, TransportConfig};
use localp2p::security::Authenticator;
use localp2p::{NodeIdentity, Transport};

/// Pre-shared key used by nodes that should trust each other.
pub const PSK: &str = "6c6f63616c7032702d746573742d6b65792d30303031";

/// A different key, for nodes that must not authenticate.
#[allow(dead_code)]
pub const OTHER_PSK: &str = "6f746865722d6e6574776f726b2d6b65792d30303032";

/// Transport settings bound to an ephemeral loopback port.
pub fn transport_config() -> TransportConfig {
    let mut config = TransportConfig::default();
    config.bind_address = "127.0.0.1:0".to_string();
    config.shared_secret = Some(PSK.to_string());
    config.drain_timeout_secs = 2;
    config
}

/// A transport for node `id` keyed with `psk`. Not started.
pub fn transport_with(id: &str, psk: &str, config: TransportConfig) -> Transport {
    let auth = Authenticator::from_hex(id, psk).unwrap();
    Transport::new(NodeIdentity::new(id, id), auth, config)
}

/// Start a transport for node `id` on an ephemeral port. Returns it and its port.
pub async fn start_transport(id: &str) -> (Transport, u16) {
    start_transport_with(id, PSK, transport_config()).await
}

#[allow(dead_code)]
pub async fn start_transport_with(id: &str, psk: &str, config: TransportConfig) -> (Transport, u16) {
    let transport = transport_with(id, psk, config);
    let addr = transport.start().await.unwrap();
    (transport, addr.port())
}

/// Full node config on ephemeral ports, control plane included, mDNS off.
#[allow(dead_code)]
pub fn node_config(id: &str) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.node.id = id.to_string();
    config.node.display_name = id.to_string();
    config.transport = transport_config();
    config.control.bind_address = "127.0.0.1:0".to_string();
    config.discovery.mdns_enabled = false;
    config
}

/// Poll `check` every 20ms until it returns true or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Whether `transport` currently has a connection keyed `peer_id`.
pub async fn has_peer(transport: &Transport, peer_id: &str) -> bool {
    transport.table().contains(peer_id).await
}
