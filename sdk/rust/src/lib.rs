//! Client for a localp2p node's control plane.

pub mod client;

pub use client::{ConnectionEntry, ControlClient, PeerEntry, SdkError};
