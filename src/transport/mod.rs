//! Peer transport subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     listener.rs (accept, admission cap)
//!     → handshake.rs (acceptor: challenge, verify, prove)
//!     → table.rs (insert, replace previous)
//!     → manager.rs read loop → frame.rs decode → queue.rs → consumer
//!
//! Outbound:
//!     manager.rs connect_to_peer (dial with timeout)
//!     → handshake.rs (initiator: answer, counter-challenge, verify proof)
//!     → table.rs → read loop as above
//!
//! Send:
//!     manager.rs send_message → table.rs lookup → connection.rs writer
//!
//! Background:
//!     reaper.rs (evict idle connections)
//! ```

pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod listener;
pub mod manager;
pub mod queue;
pub mod reaper;
pub mod table;

pub use connection::{ConnectionInfo, Direction};
pub use error::{DecodeError, FrameError, HandshakeError, TransportError};
pub use frame::Message;
pub use manager::Transport;
pub use queue::Messages;
