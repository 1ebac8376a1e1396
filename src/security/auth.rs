//! Challenge-response authenticator.
//!
//! Responses are `hex(HMAC-SHA256(secret, len(node_id) ‖ node_id ‖ challenge))`,
//! so a response proves knowledge of the secret *and* binds the responder's id.
//! Peers authenticate each other only when they hold the same secret.

use std::fmt;

use hmac::digest::Key;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Size of a challenge token before hex encoding.
pub const CHALLENGE_LEN: usize = 16;

/// Smallest accepted pre-shared key.
pub const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("shared secret is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("shared secret must be at least {min} bytes, got {0}", min = MIN_SECRET_LEN)]
    TooShort(usize),

    #[error("shared secret cannot key HMAC-SHA256")]
    InvalidKey,
}

/// Issues challenges and computes/verifies responses for one node.
///
/// The secret is fixed at construction and never rotated.
#[derive(Clone)]
pub struct Authenticator {
    node_id: String,
    keyed: HmacSha256,
}

impl Authenticator {
    /// Authenticator with a random per-process secret.
    ///
    /// Only processes sharing this exact instance's secret can authenticate
    /// against it; use [`Authenticator::with_secret`] for a real deployment.
    pub fn new(node_id: impl Into<String>) -> Self {
        let mut secret = Key::<HmacSha256>::default();
        rand::thread_rng().fill_bytes(&mut secret);
        Self {
            node_id: node_id.into(),
            keyed: HmacSha256::new(&secret),
        }
    }

    /// Authenticator keyed with a pre-shared secret.
    pub fn with_secret(node_id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Result<Self, SecretError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(SecretError::TooShort(secret.len()));
        }
        let keyed = HmacSha256::new_from_slice(&secret).map_err(|_| SecretError::InvalidKey)?;
        Ok(Self {
            node_id: node_id.into(),
            keyed,
        })
    }

    /// Authenticator keyed with a hex-encoded pre-shared secret.
    pub fn from_hex(node_id: impl Into<String>, secret_hex: &str) -> Result<Self, SecretError> {
        let secret = hex::decode(secret_hex.trim())?;
        Self::with_secret(node_id, secret)
    }

    /// Build from the optional configured secret, falling back to a random one.
    pub fn from_config(node_id: impl Into<String>, shared_secret: Option<&str>) -> Result<Self, SecretError> {
        let node_id = node_id.into();
        match shared_secret {
            Some(secret_hex) => Self::from_hex(node_id, secret_hex),
            None => {
                tracing::warn!(
                    node_id = %node_id,
                    "No shared secret configured; generated a per-process secret, peers will fail to authenticate"
                );
                Ok(Self::new(node_id))
            }
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Fresh random challenge: 16 bytes, hex encoded.
    ///
    /// Challenges are not stored; each handshake verifies against its own.
    pub fn generate_challenge(&self) -> String {
        let mut challenge = [0u8; CHALLENGE_LEN];
        rand::thread_rng().fill_bytes(&mut challenge);
        hex::encode(challenge)
    }

    /// Response proving this node holds the secret.
    pub fn compute_response(&self, challenge: &str) -> String {
        self.digest(&self.node_id, challenge)
    }

    /// Check `response` as the answer of `peer_id` to `challenge`.
    pub fn verify_response(&self, peer_id: &str, challenge: &str, response: &str) -> bool {
        let expected = self.digest(peer_id, challenge);
        constant_time_compare(&expected, response)
    }

    fn digest(&self, node_id: &str, challenge: &str) -> String {
        let mut mac = self.keyed.clone();
        mac.update(&(node_id.len() as u32).to_be_bytes());
        mac.update(node_id.as_bytes());
        mac.update(challenge.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("node_id", &self.node_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Constant-time string comparison.
///
/// Takes the same time however many leading bytes match; unequal lengths
/// compare unequal without an early return.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    let max_len = std::cmp::max(a.len(), b.len());

    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];
    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);

    (lengths_equal & contents_equal).into()
}
