//! RPC request parsing and response envelopes.
//!
//! Requests arrive as `{"method": string, "params": object?}`. They are parsed
//! once into [`RpcRequest`] so handlers never touch untyped params.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Raw request body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcEnvelope {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A validated control-plane request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcRequest {
    Discover,
    Connect { address: String, port: u16 },
    Send { to: String, content: String },
    Connections,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RpcRequestError {
    #[error("Invalid JSON request: {0}")]
    InvalidJson(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

#[derive(Deserialize)]
struct ConnectParams {
    address: String,
    port: u16,
}

#[derive(Deserialize)]
struct SendParams {
    to: String,
    content: String,
}

impl RpcRequest {
    /// Parse a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, RpcRequestError> {
        let envelope: RpcEnvelope =
            serde_json::from_slice(body).map_err(|e| RpcRequestError::InvalidJson(e.to_string()))?;
        Self::parse(envelope)
    }

    pub fn parse(envelope: RpcEnvelope) -> Result<Self, RpcRequestError> {
        match envelope.method.as_str() {
            "discover" => Ok(RpcRequest::Discover),
            "connections" => Ok(RpcRequest::Connections),
            "connect" => {
                let params: ConnectParams = params(envelope.params)?;
                if params.address.trim().is_empty() {
                    return Err(RpcRequestError::InvalidParams("address must not be empty".to_string()));
                }
                if params.port == 0 {
                    return Err(RpcRequestError::InvalidParams("port must not be 0".to_string()));
                }
                Ok(RpcRequest::Connect {
                    address: params.address,
                    port: params.port,
                })
            }
            "send" => {
                let params: SendParams = params(envelope.params)?;
                if params.to.is_empty() {
                    return Err(RpcRequestError::InvalidParams("to must not be empty".to_string()));
                }
                Ok(RpcRequest::Send {
                    to: params.to,
                    content: params.content,
                })
            }
            other => Err(RpcRequestError::UnknownMethod(other.to_string())),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::Discover => "discover",
            RpcRequest::Connect { .. } => "connect",
            RpcRequest::Send { .. } => "send",
            RpcRequest::Connections => "connections",
        }
    }
}

fn params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcRequestError> {
    let params = params.ok_or_else(|| RpcRequestError::InvalidParams("missing params".to_string()))?;
    serde_json::from_value(params).map_err(|e| RpcRequestError::InvalidParams(e.to_string()))
}

/// Response body: exactly one of `result` or `error` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn result(value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self {
                result: Some(value),
                error: None,
            },
            Err(e) => Self::error(format!("failed to encode result: {}", e)),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(message.into()),
        }
    }
}
