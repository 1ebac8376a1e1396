//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Build identity and authenticator
//! - Start the transport, then discovery, then the control plane
//! - Tear them down in reverse order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The control plane starts last (API traffic only when ready)

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::validation::{validate_config, ValidationError};
use crate::config::NodeConfig;
use crate::control::{ControlServer, ControlState};
use crate::discovery::{DiscoveryError, MdnsDiscovery, PeerDirectory};
use crate::identity::NodeIdentity;
use crate::lifecycle::Shutdown;
use crate::security::{Authenticator, SecretError};
use crate::transport::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join_errors(.0))]
    Config(Vec<ValidationError>),

    #[error("invalid shared secret: {0}")]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to start discovery: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("failed to bind control plane on {address}: {source}")]
    ControlBind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

/// A running node: transport, peer directory and control plane.
pub struct Node {
    identity: NodeIdentity,
    transport: Transport,
    directory: PeerDirectory,
    mdns: Option<MdnsDiscovery>,
    shutdown: Shutdown,
    transport_addr: SocketAddr,
    control_addr: Option<SocketAddr>,
    control_task: Option<JoinHandle<()>>,
}

impl Node {
    pub async fn start(config: NodeConfig) -> Result<Self, StartupError> {
        validate_config(&config).map_err(StartupError::Config)?;

        let identity = NodeIdentity::from_config(&config);
        let auth = Authenticator::from_config(identity.id(), config.transport.shared_secret.as_deref())?;
        tracing::info!(node = %identity, "Starting node");

        // 1. Transport
        let transport = Transport::new(identity.clone(), auth, config.transport.clone());
        let transport_addr = transport.start().await?;

        // 2. Discovery
        let shutdown = Shutdown::new();
        let directory = PeerDirectory::new(identity.id(), config.discovery.peer_ttl());
        directory.seed_static(&config.discovery.static_peers);
        let mdns = if config.discovery.mdns_enabled {
            match MdnsDiscovery::start(
                &config.discovery,
                &identity,
                transport_addr.port(),
                directory.clone(),
                shutdown.subscribe(),
            ) {
                Ok(mdns) => Some(mdns),
                Err(e) => {
                    transport.shutdown().await;
                    return Err(e.into());
                }
            }
        } else {
            tracing::info!("mDNS discovery disabled");
            None
        };

        // 3. Control plane
        let (control_addr, control_task) = if config.control.enabled {
            let listener = match TcpListener::bind(&config.control.bind_address).await {
                Ok(listener) => listener,
                Err(source) => {
                    shutdown.trigger();
                    if let Some(mdns) = mdns {
                        mdns.stop().await;
                    }
                    transport.shutdown().await;
                    return Err(StartupError::ControlBind {
                        address: config.control.bind_address.clone(),
                        source,
                    });
                }
            };
            let addr = listener.local_addr().ok();
            let server = ControlServer::new(
                &config.control,
                ControlState {
                    transport: transport.clone(),
                    directory: directory.clone(),
                },
            );
            let shutdown_rx = shutdown.subscribe();
            let task = tokio::spawn(async move {
                if let Err(e) = server.run(listener, shutdown_rx).await {
                    tracing::error!(error = %e, "Control server failed");
                }
            });
            (addr, Some(task))
        } else {
            tracing::info!("Control plane disabled");
            (None, None)
        };

        tracing::info!(
            node_id = %identity.id(),
            transport = %transport_addr,
            control = ?control_addr,
            "Node started"
        );

        Ok(Self {
            identity,
            transport,
            directory,
            mdns,
            shutdown,
            transport_addr,
            control_addr,
            control_task,
        })
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn transport_addr(&self) -> SocketAddr {
        self.transport_addr
    }

    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_addr
    }

    /// Stop the control plane and discovery, then the transport.
    pub async fn shutdown(mut self) {
        tracing::info!(node_id = %self.identity.id(), "Shutting down node");

        self.shutdown.trigger();
        if let Some(task) = self.control_task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Control server task ended abnormally");
            }
        }
        if let Some(mdns) = self.mdns.take() {
            mdns.stop().await;
        }

        self.transport.shutdown().await;
        tracing::info!("Shutdown complete");
    }
}
