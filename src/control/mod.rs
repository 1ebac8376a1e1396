//! Control plane: a local JSON-RPC style HTTP API over the transport and
//! the peer directory.
//!
//! # Data Flow
//! ```text
//! POST /rpc
//!     → auth.rs (bearer API key, when configured)
//!     → rpc.rs (parse into RpcRequest, 400 on failure)
//!     → server.rs dispatch (transport / directory)
//!     → {"result": ...} or {"error": ...}
//! ```

pub mod auth;
pub mod rpc;
pub mod server;

pub use rpc::{RpcEnvelope, RpcRequest, RpcRequestError, RpcResponse};
pub use server::{ControlServer, ControlState};
