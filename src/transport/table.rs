//! The table of authenticated connections, keyed by peer id.
//!
//! One `RwLock` guards the map. Lookups and listings take it shared;
//! insert, remove and the reaper sweep take it exclusively. Call sites never
//! see the map itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::transport::connection::{Connection, ConnectionId, ConnectionInfo};

#[derive(Debug, Default)]
pub struct ConnectionTable {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under the connection's peer id, replacing any existing entry.
    ///
    /// Marks the connection as active. The superseded connection, if any, is
    /// returned still open; the caller decides how to close it.
    pub async fn insert(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        conn.touch();
        let mut connections = self.connections.write().await;
        connections.insert(conn.peer_id().to_string(), conn)
    }

    pub async fn lookup(&self, peer_id: &str) -> Option<Arc<Connection>> {
        self.connections.read().await.get(peer_id).cloned()
    }

    pub async fn contains(&self, peer_id: &str) -> bool {
        self.connections.read().await.contains_key(peer_id)
    }

    pub async fn remove(&self, peer_id: &str) -> Option<Arc<Connection>> {
        self.connections.write().await.remove(peer_id)
    }

    /// Remove the entry for `peer_id` only if it is still connection `id`.
    ///
    /// A read loop whose connection was superseded must not evict its
    /// replacement.
    pub async fn remove_if_current(&self, peer_id: &str, id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(peer_id) {
            Some(current) if current.id() == id => {
                connections.remove(peer_id);
                true
            }
            _ => false,
        }
    }

    /// Listing of every connection, sorted by peer id.
    pub async fn snapshot(&self) -> Vec<ConnectionInfo> {
        let connections = self.connections.read().await;
        let mut infos: Vec<_> = connections.values().map(|conn| conn.info()).collect();
        infos.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        infos
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Close and remove every connection idle for longer than `stale_after`
    /// as of `now`. Returns the evicted peer ids.
    pub async fn sweep_stale(&self, now: Instant, stale_after: Duration) -> Vec<String> {
        let mut connections = self.connections.write().await;
        let mut evicted = Vec::new();
        connections.retain(|peer_id, conn| {
            if conn.idle_for(now) > stale_after {
                conn.close();
                evicted.push(peer_id.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Close and remove every connection. Returns how many there were.
    pub async fn close_all(&self) -> usize {
        let mut connections = self.connections.write().await;
        let count = connections.len();
        for (_, conn) in connections.drain() {
            conn.close();
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::connection::Direction;

    fn conn(peer_id: &str) -> Arc<Connection> {
        let (local, _remote) = tokio::io::duplex(64);
        Arc::new(Connection::new(ConnectionId::new(), peer_id, local, Direction::Inbound, None))
    }

    #[tokio::test]
    async fn lookup_only_after_insert() {
        let table = ConnectionTable::new();
        assert!(table.lookup("beta").await.is_none());

        let beta = conn("beta");
        assert!(table.insert(beta.clone()).await.is_none());

        let found = table.lookup("beta").await.unwrap();
        assert_eq!(found.id(), beta.id());
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn insert_overwrites_existing_peer() {
        let table = ConnectionTable::new();
        let old = conn("beta");
        let new = conn("beta");

        table.insert(old.clone()).await;
        let superseded = table.insert(new.clone()).await.unwrap();

        assert_eq!(superseded.id(), old.id());
        assert_eq!(table.lookup("beta").await.unwrap().id(), new.id());
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn stale_read_loop_does_not_evict_replacement() {
        let table = ConnectionTable::new();
        let old = conn("beta");
        let new = conn("beta");
        table.insert(old.clone()).await;
        table.insert(new.clone()).await;

        assert!(!table.remove_if_current("beta", old.id()).await);
        assert!(table.contains("beta").await);

        assert!(table.remove_if_current("beta", new.id()).await);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn sweep_evicts_only_stale_entries() {
        let table = ConnectionTable::new();
        let stale = conn("stale");
        let fresh = conn("fresh");
        table.insert(stale.clone()).await;
        table.insert(fresh.clone()).await;

        let base = Instant::now();
        stale.touch_at(base);
        fresh.touch_at(base + Duration::from_secs(51));

        // As of base + 61s: stale idle 61s, fresh idle 10s.
        let evicted = table
            .sweep_stale(base + Duration::from_secs(61), Duration::from_secs(60))
            .await;

        assert_eq!(evicted, vec!["stale".to_string()]);
        assert!(stale.is_closed());
        assert!(!fresh.is_closed());
        assert!(table.lookup("stale").await.is_none());
        assert!(table.lookup("fresh").await.is_some());
    }

    #[tokio::test]
    async fn snapshot_is_sorted() {
        let table = ConnectionTable::new();
        for peer in ["gamma", "alpha", "beta"] {
            table.insert(conn(peer)).await;
        }
        let peers: Vec<_> = table.snapshot().await.into_iter().map(|i| i.peer_id).collect();
        assert_eq!(peers, vec!["alpha", "beta", "gamma"]);
        assert!(table.snapshot().await.iter().all(|i| i.authenticated));
    }

    #[tokio::test]
    async fn close_all_empties_table() {
        let table = ConnectionTable::new();
        let a = conn("a");
        let b = conn("b");
        table.insert(a.clone()).await;
        table.insert(b.clone()).await;

        assert_eq!(table.close_all().await, 2);
        assert!(table.is_empty().await);
        assert!(a.is_closed() && b.is_closed());
    }
}
