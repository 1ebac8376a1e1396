//! LocalP2P node library.
//!
//! A local-network peer node: authenticated TCP connections, newline-delimited
//! JSON messages, and a small HTTP control plane.

pub mod config;
pub mod control;
pub mod discovery;
pub mod identity;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod transport;

pub use config::schema::NodeConfig;
pub use identity::NodeIdentity;
pub use lifecycle::{Node, Shutdown};
pub use transport::{Message, Transport, TransportError};
