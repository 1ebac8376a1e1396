//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Listener accept failure:
//!     → backoff.rs (exponential delay with jitter before the next accept)
//! ```
//!
//! # Design Decisions
//! - Dial and handshake deadlines live with the transport config, not here
//! - Failed dials and handshakes are never retried automatically

pub mod backoff;
