//! Control plane HTTP server.
//!
//! # Responsibilities
//! - Create the Axum router for `/rpc` and `/health`
//! - Wire up middleware (tracing, timeout, optional API key)
//! - Dispatch parsed RPC requests to the transport and the peer directory
//! - Stop on the node's shutdown broadcast

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ControlConfig;
use crate::control::auth::api_key_middleware;
use crate::control::rpc::{RpcRequest, RpcResponse};
use crate::discovery::PeerDirectory;
use crate::transport::Transport;

/// State shared by the handlers.
#[derive(Clone)]
pub struct ControlState {
    pub transport: Transport,
    pub directory: PeerDirectory,
}

#[derive(Serialize)]
struct ConnectResult {
    peer_id: String,
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    node_id: String,
    version: &'static str,
    connections: usize,
}

/// HTTP server for the control plane.
pub struct ControlServer {
    router: Router,
}

impl ControlServer {
    pub fn new(config: &ControlConfig, state: ControlState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(config: &ControlConfig, state: ControlState) -> Router {
        let mut rpc = Router::new().route("/rpc", post(rpc_handler));
        if let Some(api_key) = config.api_key.as_deref().filter(|key| !key.is_empty()) {
            let api_key: Arc<str> = Arc::from(api_key);
            rpc = rpc.route_layer(middleware::from_fn_with_state(api_key, api_key_middleware));
        }

        Router::new()
            .route("/health", get(health_handler))
            .merge(rpc)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve on `listener` until the shutdown broadcast fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Control server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Control server stopped");
        Ok(())
    }
}

async fn health_handler(State(state): State<ControlState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        node_id: state.transport.node_id().to_string(),
        version: env!("CARGO_PKG_VERSION"),
        connections: state.transport.table().len().await,
    })
}

async fn rpc_handler(State(state): State<ControlState>, body: Bytes) -> Response {
    let request = match RpcRequest::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected RPC request");
            return (StatusCode::BAD_REQUEST, Json(RpcResponse::error(e.to_string()))).into_response();
        }
    };

    let method = request.method();
    let response = dispatch(&state, request).await;
    if let Some(error) = &response.error {
        tracing::info!(method, error = %error, "RPC failed");
    } else {
        tracing::debug!(method, "RPC handled");
    }
    (StatusCode::OK, Json(response)).into_response()
}

async fn dispatch(state: &ControlState, request: RpcRequest) -> RpcResponse {
    match request {
        RpcRequest::Discover => RpcResponse::result(state.directory.peers()),
        RpcRequest::Connections => RpcResponse::result(state.transport.connections().await),
        RpcRequest::Connect { address, port } => match state.transport.connect_to_peer(&address, port).await {
            Ok(peer_id) => RpcResponse::result(ConnectResult { peer_id }),
            Err(e) => RpcResponse::error(e.to_string()),
        },
        RpcRequest::Send { to, content } => match state.transport.send_message(&to, content).await {
            Ok(()) => RpcResponse::result("Message sent"),
            Err(e) => RpcResponse::error(e.to_string()),
        },
    }
}
