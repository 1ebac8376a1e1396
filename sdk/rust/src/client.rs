use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub type SdkError = Box<dyn std::error::Error + Send + Sync>;

/// A peer known to the node's directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEntry {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub last_seen: String,
    pub source: String,
}

/// A live authenticated connection on the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub peer_id: String,
    pub authenticated: bool,
    pub last_seen: String,
    pub direction: String,
    pub remote_addr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<String>,
}

pub struct ControlClient {
    client: Client,
    node_url: String,
    api_key: Option<String>,
}

impl ControlClient {
    pub fn new(node_url: &str) -> Self {
        Self {
            client: Client::new(),
            node_url: node_url.trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Send `Authorization: Bearer <key>` with every RPC.
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    /// Peers the node can dial.
    pub async fn discover(&self) -> Result<Vec<PeerEntry>, SdkError> {
        let result = self.call("discover", None).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Ask the node to dial and authenticate a peer. Returns the peer id.
    pub async fn connect(&self, address: &str, port: u16) -> Result<String, SdkError> {
        let result = self
            .call("connect", Some(json!({ "address": address, "port": port })))
            .await?;
        result
            .get("peer_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| format!("connect returned no peer_id: {}", result).into())
    }

    /// Send a message to a connected peer.
    pub async fn send(&self, to: &str, content: &str) -> Result<(), SdkError> {
        self.call("send", Some(json!({ "to": to, "content": content })))
            .await?;
        Ok(())
    }

    /// The node's current connections.
    pub async fn connections(&self) -> Result<Vec<ConnectionEntry>, SdkError> {
        let result = self.call("connections", None).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// The `/health` document.
    pub async fn health(&self) -> Result<Value, SdkError> {
        let resp = self
            .client
            .get(format!("{}/health", self.node_url))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(format!("Node returned error status {}", resp.status()).into());
        }
        Ok(resp.json().await?)
    }

    /// Perform one RPC. Operation errors reported by the node become `Err`.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, SdkError> {
        let mut body = json!({ "method": method });
        if let Some(params) = params {
            body["params"] = params;
        }

        let mut request = self
            .client
            .post(format!("{}/rpc", self.node_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let resp = request.send().await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err("Node rejected the API key".into());
        }
        let text = resp.text().await?;

        let rpc: RpcResponse = match serde_json::from_str(&text) {
            Ok(rpc) => rpc,
            Err(_) => return Err(format!("Node returned error status {}: {}", status, text).into()),
        };
        if let Some(error) = rpc.error {
            return Err(error.into());
        }
        Ok(rpc.result.unwrap_or(Value::Null))
    }
}
