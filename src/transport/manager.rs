//! The transport: acceptor, dialer, per-connection read loops and sends.
//!
//! # Responsibilities
//! - Accept inbound sockets and run the acceptor handshake on each
//! - Dial peers and run the initiator handshake
//! - Install authenticated connections in the table and read from them
//! - Deliver decoded messages to the shared queue
//! - Start the reaper and coordinate shutdown
//!
//! # Design Decisions
//! - One task per live connection; the handshake runs inside it
//! - The authenticated peer id always replaces `from` on received messages
//! - A read loop removes its table entry only while it is still current
//! - Write failures are reported to the caller and never evict; a write that
//!   times out closes the connection, since a partial frame may be on the wire
//! - Outgoing messages larger than the frame limit are refused before writing

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::io::AsyncRead;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

use crate::config::TransportConfig;
use crate::identity::NodeIdentity;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;
use crate::security::Authenticator;
use crate::transport::connection::{Connection, ConnectionId, ConnectionInfo, ConnectionTracker, Direction};
use crate::transport::error::{HandshakeError, TransportError};
use crate::transport::frame::{decode_message, encode_line, FrameReader, Message};
use crate::transport::handshake::{Handshake, Role};
use crate::transport::listener::{Listener, ListenerError};
use crate::transport::queue::{message_queue, Messages};
use crate::transport::reaper::Reaper;
use crate::transport::table::ConnectionTable;

const ACCEPT_BACKOFF_BASE_MS: u64 = 50;
const ACCEPT_BACKOFF_MAX_MS: u64 = 2_000;

/// Handle to a node's peer transport. Cheap to clone.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

struct Inner {
    identity: NodeIdentity,
    auth: Authenticator,
    config: TransportConfig,
    table: Arc<ConnectionTable>,
    queue_tx: mpsc::Sender<Message>,
    messages: Mutex<Option<Messages>>,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    local_addr: OnceLock<SocketAddr>,
}

impl Transport {
    pub fn new(identity: NodeIdentity, auth: Authenticator, config: TransportConfig) -> Self {
        let (queue_tx, messages) = message_queue(config.queue_capacity);
        Self {
            inner: Arc::new(Inner {
                identity,
                auth,
                config,
                table: Arc::new(ConnectionTable::new()),
                queue_tx,
                messages: Mutex::new(Some(messages)),
                shutdown: Shutdown::new(),
                tracker: ConnectionTracker::new(),
                local_addr: OnceLock::new(),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        self.inner.identity.id()
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.inner.identity
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr.get().copied()
    }

    /// Bind the listener and spawn the acceptor and the reaper.
    pub async fn start(&self) -> Result<SocketAddr, TransportError> {
        if self.inner.shutdown.is_triggered() {
            return Err(TransportError::ShuttingDown);
        }
        if self.inner.local_addr.get().is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let listener = Listener::bind(&self.inner.config).await?;
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        self.inner
            .local_addr
            .set(addr)
            .map_err(|_| TransportError::AlreadyStarted)?;

        let acceptor = self.clone();
        let shutdown_rx = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            acceptor.accept_loop(listener, shutdown_rx).await;
        });

        let reaper = Reaper::new(
            self.inner.table.clone(),
            self.inner.config.reap_interval(),
            self.inner.config.stale_after(),
        );
        tokio::spawn(reaper.run(self.inner.shutdown.subscribe()));

        tracing::info!(
            node_id = %self.node_id(),
            address = %addr,
            "Transport started"
        );
        Ok(addr)
    }

    /// Dial `address:port`, authenticate, and start reading from the peer.
    ///
    /// Returns the authenticated peer id. An existing connection to the same
    /// peer is replaced.
    pub async fn connect_to_peer(&self, address: &str, port: u16) -> Result<String, TransportError> {
        if self.inner.shutdown.is_triggered() {
            return Err(TransportError::ShuttingDown);
        }

        let target = dial_target(address, port);
        let connect_timeout = self.inner.config.connect_timeout();
        tracing::debug!(target = %target, "Dialing peer");

        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(target.as_str())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(TransportError::Connect { address: target, source }),
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    address: target,
                    after: connect_timeout,
                })
            }
        };
        let remote_addr = stream.peer_addr().ok();

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half, self.inner.config.max_frame_bytes);
        let peer_id = self
            .authenticate(Role::Initiator, &mut reader, &mut write_half, &target)
            .await?;

        let conn = self
            .install(&peer_id, write_half, Direction::Outbound, remote_addr)
            .await?;

        let transport = self.clone();
        let guard = self.inner.tracker.track();
        tokio::spawn(async move {
            transport.read_loop(conn, reader).await;
            drop(guard);
        });

        Ok(peer_id)
    }

    /// Send `content` to a connected peer.
    ///
    /// Fails without writing if the encoded frame exceeds `max_frame_bytes`.
    /// The write, including the wait for concurrent senders, is bounded by
    /// `write_timeout_secs`.
    pub async fn send_message(&self, to: &str, content: impl Into<String>) -> Result<(), TransportError> {
        let conn = self
            .inner
            .table
            .lookup(to)
            .await
            .ok_or_else(|| TransportError::NotConnected(to.to_string()))?;

        let message = Message::new(self.node_id(), to, content);
        let line = encode_line(&message).map_err(|source| TransportError::Write {
            peer_id: to.to_string(),
            source,
        })?;
        let size = line.len().saturating_sub(1);
        let limit = self.inner.config.max_frame_bytes;
        if size > limit {
            return Err(TransportError::MessageTooLarge { size, limit });
        }

        let write_timeout = self.inner.config.write_timeout();
        match tokio::time::timeout(write_timeout, conn.send_line(&line)).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                tracing::warn!(peer_id = %to, connection_id = %conn.id(), error = %source, "Send failed");
                return Err(TransportError::Write {
                    peer_id: to.to_string(),
                    source,
                });
            }
            Err(_) => {
                tracing::warn!(
                    peer_id = %to,
                    connection_id = %conn.id(),
                    timeout_secs = write_timeout.as_secs(),
                    "Send timed out, closing connection"
                );
                conn.close();
                return Err(TransportError::WriteTimeout {
                    peer_id: to.to_string(),
                    after: write_timeout,
                });
            }
        }

        metrics::record_message_sent();
        tracing::debug!(peer_id = %to, connection_id = %conn.id(), "Message sent");
        Ok(())
    }

    /// Current connections, sorted by peer id.
    pub async fn connections(&self) -> Vec<ConnectionInfo> {
        self.inner.table.snapshot().await
    }

    /// Take the consumer end of the message queue. `None` after the first call.
    pub fn messages(&self) -> Option<Messages> {
        self.inner
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn table(&self) -> &Arc<ConnectionTable> {
        &self.inner.table
    }

    /// Number of live connection handler tasks.
    pub fn active_handlers(&self) -> u64 {
        self.inner.tracker.active_count()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_triggered()
    }

    /// Stop accepting, close every connection and wait for handlers to exit.
    ///
    /// Returns `true` if all handlers drained within the drain timeout.
    pub async fn shutdown(&self) -> bool {
        self.inner.shutdown.trigger();

        let closed = self.inner.table.close_all().await;
        metrics::set_active_connections(0);
        tracing::info!(node_id = %self.node_id(), closed, "Transport shutting down");

        let drained = self
            .inner
            .tracker
            .wait_for_drain(self.inner.config.drain_timeout())
            .await;
        if !drained {
            tracing::warn!(
                remaining = self.inner.tracker.active_count(),
                "Connection handlers did not drain before timeout"
            );
        }
        drained
    }

    async fn accept_loop(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) {
        let mut backoff = Backoff::new(ACCEPT_BACKOFF_BASE_MS, ACCEPT_BACKOFF_MAX_MS);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr, permit)) => {
                        backoff.reset();
                        let transport = self.clone();
                        let guard = self.inner.tracker.track();
                        tokio::spawn(async move {
                            transport.handle_inbound(stream, remote_addr).await;
                            drop(permit);
                            drop(guard);
                        });
                    }
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        metrics::record_accept_error();
                        let delay = backoff.next_delay();
                        tracing::warn!(
                            error = %e,
                            retry_in_ms = delay.as_millis() as u64,
                            "Accept failed"
                        );
                        tokio::time::sleep(delay).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Acceptor received shutdown signal, closing listener");
                    break;
                }
            }
        }
    }

    async fn handle_inbound(&self, stream: TcpStream, remote_addr: SocketAddr) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half, self.inner.config.max_frame_bytes);

        let peer = remote_addr.to_string();
        let peer_id = match self
            .authenticate(Role::Acceptor, &mut reader, &mut write_half, &peer)
            .await
        {
            Ok(peer_id) => peer_id,
            Err(_) => return,
        };

        match self
            .install(&peer_id, write_half, Direction::Inbound, Some(remote_addr))
            .await
        {
            Ok(conn) => self.read_loop(conn, reader).await,
            Err(e) => {
                tracing::debug!(peer_id = %peer_id, error = %e, "Discarding inbound connection");
            }
        }
    }

    async fn authenticate<R>(
        &self,
        role: Role,
        reader: &mut FrameReader<R>,
        writer: &mut OwnedWriteHalf,
        remote: &str,
    ) -> Result<String, HandshakeError>
    where
        R: AsyncRead + Unpin,
    {
        let mut handshake = Handshake::new(&self.inner.auth, role, self.inner.config.handshake_timeout());
        match handshake.run(reader, writer).await {
            Ok(peer_id) => {
                metrics::record_handshake(role.as_str(), "ok");
                tracing::info!(role = role.as_str(), remote = %remote, peer_id = %peer_id, "Peer authenticated");
                Ok(peer_id)
            }
            Err(e) => {
                metrics::record_handshake(role.as_str(), e.kind());
                tracing::warn!(role = role.as_str(), remote = %remote, error = %e, "Handshake failed");
                Err(e)
            }
        }
    }

    /// Put an authenticated connection in the table, closing the one it replaces.
    async fn install(
        &self,
        peer_id: &str,
        writer: OwnedWriteHalf,
        direction: Direction,
        remote_addr: Option<SocketAddr>,
    ) -> Result<Arc<Connection>, TransportError> {
        if self.inner.shutdown.is_triggered() {
            return Err(TransportError::ShuttingDown);
        }

        let conn = Arc::new(Connection::new(ConnectionId::new(), peer_id, writer, direction, remote_addr));
        if let Some(previous) = self.inner.table.insert(conn.clone()).await {
            tracing::info!(
                peer_id = %peer_id,
                previous = %previous.id(),
                connection_id = %conn.id(),
                "Replacing existing connection"
            );
            previous.close();
        }

        // Shutdown may have swept the table between the check and the insert.
        if self.inner.shutdown.is_triggered() {
            self.inner.table.remove_if_current(peer_id, conn.id()).await;
            conn.close();
            return Err(TransportError::ShuttingDown);
        }

        metrics::set_active_connections(self.inner.table.len().await);
        Ok(conn)
    }

    async fn read_loop<R>(&self, conn: Arc<Connection>, mut reader: FrameReader<R>)
    where
        R: AsyncRead + Unpin,
    {
        let peer_id = conn.peer_id().to_string();
        let connection_id = conn.id();
        tracing::debug!(peer_id = %peer_id, connection_id = %connection_id, "Read loop started");

        loop {
            let line = tokio::select! {
                _ = conn.closed() => {
                    tracing::debug!(peer_id = %peer_id, connection_id = %connection_id, "Connection closed locally");
                    break;
                }
                line = reader.next_line() => line,
            };

            let mut message = match line {
                Ok(Some(line)) => match decode_message(line) {
                    Ok(message) => message,
                    Err(e) => {
                        metrics::record_decode_error();
                        tracing::warn!(peer_id = %peer_id, error = %e, "Skipping undecodable frame");
                        continue;
                    }
                },
                Ok(None) => {
                    tracing::info!(peer_id = %peer_id, connection_id = %connection_id, "Peer closed connection");
                    break;
                }
                Err(e) => {
                    tracing::warn!(peer_id = %peer_id, connection_id = %connection_id, error = %e, "Read failed");
                    break;
                }
            };

            message.from = peer_id.clone();
            conn.touch();

            tokio::select! {
                _ = conn.closed() => break,
                sent = self.inner.queue_tx.send(message) => {
                    if sent.is_err() {
                        break;
                    }
                    metrics::record_message_received();
                }
            }
        }

        if self.inner.table.remove_if_current(&peer_id, connection_id).await {
            metrics::set_active_connections(self.inner.table.len().await);
            tracing::info!(peer_id = %peer_id, connection_id = %connection_id, "Connection removed");
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("node_id", &self.node_id())
            .field("local_addr", &self.local_addr())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

/// `host:port`, bracketing bare IPv6 literals.
fn dial_target(address: &str, port: u16) -> String {
    if address.contains(':') && !address.starts_with('[') {
        format!("[{}]:{}", address, port)
    } else {
        format!("{}:{}", address, port)
    }
}
