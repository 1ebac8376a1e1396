//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, or write defaults on first start)
//!     → validation.rs (semantic checks)
//!     → NodeConfig (validated, immutable)
//!     → handed by value to each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::NodeConfig;
pub use schema::TransportConfig;
pub use schema::ControlConfig;
pub use schema::DiscoveryConfig;
pub use schema::ObservabilityConfig;
pub use schema::StaticPeerConfig;
