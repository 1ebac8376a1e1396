//! Authenticated peer connections and handler lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing and safe table removal
//! - Own the write half of a peer socket and serialize frame writes
//! - Track last activity for the reaper
//! - Deliver a local close signal to the connection's read loop
//! - Count live handler tasks so shutdown can wait for them

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use crate::transport::error::FrameError;
use crate::transport::frame::{encode_line, Message};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which side opened the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// An authenticated connection to one peer.
///
/// Owned by the connection table; the read loop holds a clone of the `Arc`
/// while it runs.
pub struct Connection {
    id: ConnectionId,
    peer_id: String,
    direction: Direction,
    remote_addr: Option<SocketAddr>,
    authenticated: bool,
    writer: tokio::sync::Mutex<BoxedWriter>,
    last_seen: Mutex<Instant>,
    closed: watch::Sender<bool>,
}

impl Connection {
    /// Wrap the write half of a socket that completed the handshake.
    pub fn new<W>(
        id: ConnectionId,
        peer_id: impl Into<String>,
        writer: W,
        direction: Direction,
        remote_addr: Option<SocketAddr>,
    ) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            peer_id: peer_id.into(),
            direction,
            remote_addr,
            authenticated: true,
            writer: tokio::sync::Mutex::new(Box::pin(writer)),
            last_seen: Mutex::new(Instant::now()),
            closed,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Write one message frame. Concurrent senders are serialized.
    pub async fn send(&self, message: &Message) -> Result<(), FrameError> {
        let line = encode_line(message)?;
        self.send_line(&line).await
    }

    /// Write one already encoded, newline-terminated frame.
    pub async fn send_line(&self, line: &[u8]) -> Result<(), FrameError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Record activity now.
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    /// Record activity at a given instant.
    pub fn touch_at(&self, at: Instant) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn last_seen(&self) -> Instant {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time since last activity, as seen from `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen())
    }

    /// Ask the read loop to stop. The socket is released once the table
    /// and the read loop have dropped their references.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once [`Connection::close`] has been called, immediately if
    /// it already was.
    pub async fn closed(&self) {
        let mut signal = self.closed.subscribe();
        let _ = signal.wait_for(|closed| *closed).await;
    }

    /// Snapshot for listings.
    pub fn info(&self) -> ConnectionInfo {
        let idle = self.idle_for(Instant::now());
        let last_seen = chrono::Duration::from_std(idle)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
            .unwrap_or_else(Utc::now);
        ConnectionInfo {
            peer_id: self.peer_id.clone(),
            authenticated: self.authenticated,
            last_seen,
            direction: self.direction,
            remote_addr: self.remote_addr.map(|addr| addr.to_string()),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_id", &self.peer_id)
            .field("direction", &self.direction)
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Listing entry for one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub peer_id: String,
    pub authenticated: bool,
    pub last_seen: DateTime<Utc>,
    pub direction: Direction,
    pub remote_addr: Option<String>,
}

/// Tracks live connection handlers for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    /// Current count of live handlers.
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new handler. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Get current live handler count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all handlers have exited or `timeout` elapses.
    ///
    /// Returns `true` if everything drained in time.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.active_count() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }
}

/// Guard that tracks a handler's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection handler finished");
    }
}
