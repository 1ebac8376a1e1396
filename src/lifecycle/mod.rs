//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Transport → Discovery → Control plane
//!
//! Shutdown (shutdown.rs, startup.rs):
//!     Signal received → Stop control plane → Stop accepting → Close connections → Drain
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup, reversed on shutdown
//! - Shutdown has a timeout: handlers still running after the drain deadline are abandoned

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::{Node, StartupError};
