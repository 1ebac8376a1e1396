//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Transport, control plane and lifecycle produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Peer id and connection id flow through transport log fields
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
