//! Directory of known peers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::config::StaticPeerConfig;

/// Where a peer record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerSource {
    /// Listed in the config file. Never expires.
    Static,
    /// Reported at runtime. Expires after the peer TTL.
    Announced,
}

/// A peer that can be dialed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerRecord {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub last_seen: DateTime<Utc>,
    pub source: PeerSource,
}

impl PeerRecord {
    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        if self.source == PeerSource::Static {
            return true;
        }
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.last_seen) < ttl,
            Err(_) => true,
        }
    }
}

/// A thread-safe directory of peers, keyed by peer id.
///
/// The local node's own id is never stored.
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    inner: Arc<DashMap<String, PeerRecord>>,
    local_id: String,
    ttl: Duration,
}

impl PeerDirectory {
    pub fn new(local_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            local_id: local_id.into(),
            ttl,
        }
    }

    /// Add the configured static peers.
    ///
    /// A peer without an id is keyed by `address:port`; without a name it is
    /// named after its id.
    pub fn seed_static(&self, peers: &[StaticPeerConfig]) {
        let now = Utc::now();
        for peer in peers {
            let id = peer
                .id
                .clone()
                .unwrap_or_else(|| format!("{}:{}", peer.address, peer.port));
            if id == self.local_id {
                continue;
            }
            let name = peer.name.clone().unwrap_or_else(|| id.clone());
            self.inner.insert(
                id.clone(),
                PeerRecord {
                    id,
                    name,
                    address: peer.address.clone(),
                    port: peer.port,
                    last_seen: now,
                    source: PeerSource::Static,
                },
            );
        }
        tracing::info!(count = self.inner.len(), "Seeded static peers");
    }

    /// Record that a peer announced itself now.
    pub fn observe(&self, id: &str, name: &str, address: &str, port: u16) {
        self.observe_at(id, name, address, port, Utc::now());
    }

    /// Record an announcement seen at `at`.
    ///
    /// A static entry keeps its source but takes the new address.
    pub fn observe_at(&self, id: &str, name: &str, address: &str, port: u16, at: DateTime<Utc>) {
        if id.is_empty() || id == self.local_id {
            return;
        }
        let name = if name.is_empty() { id } else { name };

        let mut entry = self.inner.entry(id.to_string()).or_insert_with(|| PeerRecord {
            id: id.to_string(),
            name: name.to_string(),
            address: address.to_string(),
            port,
            last_seen: at,
            source: PeerSource::Announced,
        });
        let record = entry.value_mut();
        record.name = name.to_string();
        record.address = address.to_string();
        record.port = port;
        record.last_seen = at;
        drop(entry);

        tracing::debug!(peer_id = %id, address = %address, port, "Observed peer");
    }

    /// Peers seen within the TTL (static peers always), sorted by id.
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.peers_at(Utc::now())
    }

    pub fn peers_at(&self, now: DateTime<Utc>) -> Vec<PeerRecord> {
        let mut peers: Vec<_> = self
            .inner
            .iter()
            .filter(|r| r.value().is_fresh(now, self.ttl))
            .map(|r| r.value().clone())
            .collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    pub fn get(&self, id: &str) -> Option<PeerRecord> {
        self.inner.get(id).map(|r| r.value().clone())
    }

    /// Drop expired announced peers. Returns how many were removed.
    pub fn prune(&self) -> usize {
        self.prune_at(Utc::now())
    }

    pub fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, record| record.is_fresh(now, self.ttl));
        let removed = before.saturating_sub(self.inner.len());
        if removed > 0 {
            tracing::debug!(removed, "Pruned expired peers");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
