//! mDNS advertisement and browsing.
//!
//! # Responsibilities
//! - Advertise this node's transport port under the configured service type
//! - Browse for other nodes in rounds and feed them into the directory
//! - Prune expired announcements after every round
//!
//! # Design Decisions
//! - TXT records carry `id` and `name`; the instance name is the fallback id
//! - Each round starts a fresh browse, so still-cached peers are re-reported
//!   and refresh their last-seen time
//! - IPv4 addresses are preferred when a service resolves to several

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::DiscoveryConfig;
use crate::discovery::PeerDirectory;
use crate::identity::NodeIdentity;
use crate::observability::metrics;

const UNREGISTER_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mDNS error: {0}")]
    Mdns(#[from] mdns_sd::Error),
}

/// A peer as described by a resolved mDNS service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub id: String,
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
}

impl Announcement {
    /// Decode a resolved service of type `service_type`.
    ///
    /// Returns `None` when the service has no usable id or address.
    pub fn from_service(info: &ServiceInfo, service_type: &str) -> Option<Self> {
        let instance = info
            .get_fullname()
            .strip_suffix(service_type)
            .map(|prefix| prefix.trim_end_matches('.'))
            .unwrap_or_default();
        let id = info
            .get_property_val_str("id")
            .filter(|id| !id.is_empty())
            .unwrap_or(instance);
        if id.is_empty() {
            return None;
        }
        let name = info
            .get_property_val_str("name")
            .filter(|name| !name.is_empty())
            .unwrap_or(id);

        Some(Self {
            id: id.to_string(),
            name: name.to_string(),
            address: pick_address(info.get_addresses())?,
            port: info.get_port(),
        })
    }
}

fn pick_address(addresses: &HashSet<IpAddr>) -> Option<IpAddr> {
    addresses
        .iter()
        .filter(|addr| addr.is_ipv4())
        .min()
        .or_else(|| addresses.iter().min())
        .copied()
}

/// Record a resolved service in the directory. Returns whether it was usable.
pub fn record_service(directory: &PeerDirectory, info: &ServiceInfo, service_type: &str) -> bool {
    match Announcement::from_service(info, service_type) {
        Some(peer) => {
            directory.observe(&peer.id, &peer.name, &peer.address.to_string(), peer.port);
            true
        }
        None => {
            tracing::debug!(service = %info.get_fullname(), "Ignoring service without id or address");
            false
        }
    }
}

/// A registered mDNS advertisement plus its browse task.
pub struct MdnsDiscovery {
    daemon: ServiceDaemon,
    fullname: String,
    browse_task: JoinHandle<()>,
}

impl MdnsDiscovery {
    /// Advertise `identity` on `port` and start browsing into `directory`.
    pub fn start(
        config: &DiscoveryConfig,
        identity: &NodeIdentity,
        port: u16,
        directory: PeerDirectory,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new()?;
        let service_type = config.service_type();

        let host_name = format!("{}.local.", identity.id());
        let properties = [("id", identity.id()), ("name", identity.display_name())];
        let info = ServiceInfo::new(&service_type, identity.id(), &host_name, "", port, &properties[..])?
            .enable_addr_auto();
        let fullname = info.get_fullname().to_string();
        daemon.register(info)?;
        tracing::info!(service = %fullname, port, "Advertising over mDNS");

        let browser = Browser {
            daemon: daemon.clone(),
            service_type,
            directory,
            interval: config.browse_interval(),
            window: config.browse_window(),
        };
        let browse_task = tokio::spawn(browser.run(shutdown));

        Ok(Self {
            daemon,
            fullname,
            browse_task,
        })
    }

    /// Withdraw the advertisement and stop the daemon.
    ///
    /// The browse task exits on the shutdown signal it was started with.
    pub async fn stop(self) {
        match self.daemon.unregister(&self.fullname) {
            Ok(status) => {
                if time::timeout(UNREGISTER_TIMEOUT, status.recv_async()).await.is_err() {
                    tracing::debug!(service = %self.fullname, "mDNS unregister not confirmed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to unregister mDNS service"),
        }

        if let Err(e) = self.browse_task.await {
            tracing::warn!(error = %e, "mDNS browse task ended abnormally");
        }
        if let Err(e) = self.daemon.shutdown() {
            tracing::debug!(error = %e, "mDNS daemon already stopped");
        }
        tracing::info!("mDNS discovery stopped");
    }
}

struct Browser {
    daemon: ServiceDaemon,
    service_type: String,
    directory: PeerDirectory,
    interval: Duration,
    window: Duration,
}

impl Browser {
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => break,
            }

            let stopped = self.browse_round(&mut shutdown).await;
            let pruned = self.directory.prune();
            if pruned > 0 {
                tracing::info!(pruned, "Expired announced peers");
            }
            metrics::set_known_peers(self.directory.len());
            if stopped {
                break;
            }
        }
        tracing::info!("mDNS browser received shutdown signal, exiting loop");
    }

    /// Listen for one window. Returns true if shutdown arrived meanwhile.
    async fn browse_round(&self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        let events = match self.daemon.browse(&self.service_type) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "mDNS browse failed");
                return false;
            }
        };

        let deadline = time::sleep(self.window);
        tokio::pin!(deadline);
        let mut stopped = false;
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = shutdown.recv() => {
                    stopped = true;
                    break;
                }
                event = events.recv_async() => match event {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        record_service(&self.directory, &info, &self.service_type);
                    }
                    Ok(ServiceEvent::ServiceRemoved(_, fullname)) => {
                        tracing::debug!(service = %fullname, "mDNS service withdrawn");
                    }
                    Ok(_) => {}
                    Err(_) => break,
                },
            }
        }

        if let Err(e) = self.daemon.stop_browse(&self.service_type) {
            tracing::debug!(error = %e, "mDNS stop_browse failed");
        }
        stopped
    }
}
