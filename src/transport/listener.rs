//! TCP listener implementation with an admission cap.
//!
//! # Responsibilities
//! - Bind to the configured transport address
//! - Accept incoming peer sockets
//! - Enforce max_connections via semaphore
//! - Surface accept errors to the acceptor loop, which logs and continues

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::config::TransportConfig;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
    /// The admission semaphore was closed.
    Closed,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Closed => write!(f, "Listener closed"),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A bounded TCP listener that limits concurrent inbound peers.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new sockets wait in the OS backlog until a slot becomes available.
#[derive(Debug)]
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Semaphore to limit concurrent connections.
    connection_limit: Arc<Semaphore>,
    /// Configured maximum connections.
    max_connections: usize,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &TransportConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(ListenerError::Bind)?;

        Self::from_tcp(listener, config.max_connections)
    }

    /// Wrap an already bound listener.
    pub fn from_tcp(listener: TcpListener, max_connections: usize) -> Result<Self, ListenerError> {
        let local_addr = listener
            .local_addr()
            .map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections,
            "Transport listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        // Then accept the connection
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This ensures the cap holds even if the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
