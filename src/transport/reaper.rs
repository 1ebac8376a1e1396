//! Stale connection reaper.
//!
//! # Responsibilities
//! - Periodically sweep the connection table
//! - Close and evict connections idle beyond the staleness threshold
//!
//! # Design Decisions
//! - The sweep holds the table's write lock for its whole pass
//! - Closing a connection wakes its read loop, which then exits
//! - The first sweep happens one interval after start

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time;

use crate::observability::metrics;
use crate::transport::table::ConnectionTable;

pub struct Reaper {
    table: Arc<ConnectionTable>,
    interval: Duration,
    stale_after: Duration,
}

impl Reaper {
    pub fn new(table: Arc<ConnectionTable>, interval: Duration, stale_after: Duration) -> Self {
        Self {
            table,
            interval,
            stale_after,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            stale_after_secs = self.stale_after.as_secs(),
            "Reaper starting"
        );

        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep(Instant::now()).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Reaper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One pass over the table as of `now`. Returns the evicted peer ids.
    pub async fn sweep(&self, now: Instant) -> Vec<String> {
        let evicted = self.table.sweep_stale(now, self.stale_after).await;
        for peer_id in &evicted {
            tracing::info!(peer_id = %peer_id, "Cleaned up stale connection");
        }
        if !evicted.is_empty() {
            metrics::record_reaped(evicted.len());
            metrics::set_active_connections(self.table.len().await);
        }
        evicted
    }
}
