//! Peer discovery.
//!
//! Keeps the set of peers this node could dial: static entries from the
//! config file plus peers announced over mDNS. It never dials them; the
//! control plane hands addresses to the transport.

pub mod directory;
pub mod mdns;

pub use directory::{PeerDirectory, PeerRecord, PeerSource};
pub use mdns::{Announcement, DiscoveryError, MdnsDiscovery};
