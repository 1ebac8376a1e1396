//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound socket:
//!     → auth.rs (challenge issued, peer response verified)
//!     → peer proves it holds the pre-shared key and its claimed id
//!     → transport promotes the socket
//!
//! Control plane request:
//!     → auth.rs constant_time_compare on the bearer token
//! ```
//!
//! # Design Decisions
//! - Fail closed: any mismatch or malformed answer rejects the peer
//! - Secrets never appear in logs or Debug output
//! - All secret comparisons are constant time

pub mod auth;

pub use auth::{constant_time_compare, Authenticator, SecretError};
