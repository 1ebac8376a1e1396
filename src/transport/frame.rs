//! Wire frames and newline-delimited JSON framing.
//!
//! Every frame is one JSON object on one line. Two shapes exist:
//!
//! ```text
//! {"type":"challenge"|"response","node_id":..,"challenge"?:..,"response"?:..}
//! {"type":"message","from":..,"to":..,"content":..,"timestamp":<RFC 3339>}
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::transport::error::{DecodeError, FrameError};

/// `type` value of application frames.
pub const MESSAGE_TYPE: &str = "message";

/// Handshake frame kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    Challenge,
    Response,
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthKind::Challenge => f.write_str("challenge"),
            AuthKind::Response => f.write_str("response"),
        }
    }
}

/// Handshake frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMessage {
    #[serde(rename = "type")]
    pub kind: AuthKind,
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl AuthMessage {
    pub fn challenge(node_id: impl Into<String>, challenge: impl Into<String>) -> Self {
        Self {
            kind: AuthKind::Challenge,
            node_id: node_id.into(),
            challenge: Some(challenge.into()),
            response: None,
        }
    }

    /// A response, optionally carrying a counter-challenge for the other side.
    pub fn response(node_id: impl Into<String>, response: impl Into<String>, counter: Option<String>) -> Self {
        Self {
            kind: AuthKind::Response,
            node_id: node_id.into(),
            challenge: counter,
            response: Some(response.into()),
        }
    }
}

/// Application message exchanged between authenticated peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    /// Sender. Overwritten with the authenticated peer id on receipt.
    #[serde(default)]
    pub from: String,
    pub to: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(from: impl Into<String>, to: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: MESSAGE_TYPE.to_string(),
            from: from.into(),
            to: to.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Parse one application frame.
pub fn decode_message(line: &[u8]) -> Result<Message, DecodeError> {
    let message: Message = serde_json::from_slice(line)?;
    if message.kind != MESSAGE_TYPE {
        return Err(DecodeError::UnexpectedType(message.kind));
    }
    Ok(message)
}

/// Serialize a frame as one newline-terminated line.
pub fn encode_line<T: Serialize>(frame: &T) -> Result<Vec<u8>, FrameError> {
    let mut line = serde_json::to_vec(frame).map_err(FrameError::Encode)?;
    line.push(b'\n');
    Ok(line)
}

/// Write one frame and flush.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize,
{
    let line = encode_line(frame)?;
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads newline-delimited frames with a per-frame size limit.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::new(),
            max_len,
        }
    }

    /// Next non-empty line, without its terminator. `None` on EOF.
    ///
    /// A line longer than the limit is an error; the stream cannot be
    /// resynchronised after it.
    pub async fn next_line(&mut self) -> Result<Option<&[u8]>, FrameError> {
        loop {
            self.buf.clear();
            let limit = self.max_len as u64 + 1;
            let read = (&mut self.inner)
                .take(limit)
                .read_until(b'\n', &mut self.buf)
                .await?;
            if read == 0 {
                return Ok(None);
            }

            let mut end = self.buf.len();
            if self.buf[end - 1] == b'\n' {
                end -= 1;
            } else if end > self.max_len {
                return Err(FrameError::TooLarge { limit: self.max_len });
            }
            if end > 0 && self.buf[end - 1] == b'\r' {
                end -= 1;
            }

            if self.buf[..end].iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(&self.buf[..end]));
        }
    }

    /// Next line decoded as `T`. The outer `Option` is `None` on EOF.
    pub async fn read_frame<T: DeserializeOwned>(&mut self) -> Result<Option<Result<T, serde_json::Error>>, FrameError> {
        Ok(self.next_line().await?.map(serde_json::from_slice))
    }
}
