//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check that addresses parse and the shared secret decodes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NodeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::NodeConfig;
use crate::security::auth::MIN_SECRET_LEN;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &NodeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let id = &config.node.id;
    if id.is_empty() {
        errors.push(ValidationError::new("node.id", "must not be empty"));
    } else if id.chars().any(char::is_whitespace) {
        errors.push(ValidationError::new("node.id", "must not contain whitespace"));
    }

    let transport = &config.transport;
    check_socket_addr(&mut errors, "transport.bind_address", &transport.bind_address);
    check_positive(&mut errors, "transport.max_connections", transport.max_connections as u64);
    check_positive(&mut errors, "transport.handshake_timeout_secs", transport.handshake_timeout_secs);
    check_positive(&mut errors, "transport.connect_timeout_secs", transport.connect_timeout_secs);
    check_positive(&mut errors, "transport.queue_capacity", transport.queue_capacity as u64);
    check_positive(&mut errors, "transport.reap_interval_secs", transport.reap_interval_secs);
    check_positive(&mut errors, "transport.stale_after_secs", transport.stale_after_secs);
    check_positive(&mut errors, "transport.max_frame_bytes", transport.max_frame_bytes as u64);
    check_positive(&mut errors, "transport.write_timeout_secs", transport.write_timeout_secs);

    if let Some(secret) = &transport.shared_secret {
        match hex::decode(secret.trim()) {
            Ok(bytes) if bytes.len() < MIN_SECRET_LEN => errors.push(ValidationError::new(
                "transport.shared_secret",
                format!("must be at least {} bytes", MIN_SECRET_LEN),
            )),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::new(
                "transport.shared_secret",
                format!("invalid hex: {}", e),
            )),
        }
    }

    if config.control.enabled {
        check_socket_addr(&mut errors, "control.bind_address", &config.control.bind_address);
        check_positive(&mut errors, "control.request_timeout_secs", config.control.request_timeout_secs);
        if matches!(&config.control.api_key, Some(key) if key.is_empty()) {
            errors.push(ValidationError::new("control.api_key", "must not be empty when set"));
        }
    }

    let discovery = &config.discovery;
    check_positive(&mut errors, "discovery.peer_ttl_secs", discovery.peer_ttl_secs);
    if discovery.mdns_enabled {
        let name = discovery.service_name.trim_end_matches('.');
        if !name.starts_with('_') || !(name.ends_with("._tcp") || name.ends_with("._udp")) {
            errors.push(ValidationError::new(
                "discovery.service_name",
                "must look like '_name._tcp' or '_name._udp'",
            ));
        }
        if discovery.domain.trim_matches('.') != "local" {
            errors.push(ValidationError::new("discovery.domain", "mDNS only supports 'local.'"));
        }
        check_positive(&mut errors, "discovery.browse_interval_secs", discovery.browse_interval_secs);
        check_positive(&mut errors, "discovery.browse_window_secs", discovery.browse_window_secs);
    }
    for (i, peer) in config.discovery.static_peers.iter().enumerate() {
        if peer.address.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("discovery.static_peers[{}].address", i),
                "must not be empty",
            ));
        }
        if peer.port == 0 {
            errors.push(ValidationError::new(
                format!("discovery.static_peers[{}].port", i),
                "must be non-zero",
            ));
        }
    }

    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if let Err(e) = value.parse::<SocketAddr>() {
        errors.push(ValidationError::new(field, format!("invalid socket address '{}': {}", value, e)));
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::new(field, "must be greater than zero"));
    }
}
