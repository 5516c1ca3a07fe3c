//! UDP gossip diffusion for edgemesh replicas.
//!
//! Each node runs one gossip task that interleaves two duties over a
//! single socket:
//!
//! 1. every tick (5 s ± 10% jitter) broadcast a `DIGEST` of the local
//!    Merkle root to every configured peer;
//! 2. answer inbound datagrams — a differing digest triggers a
//!    `PULL_REQ`, a pull request is answered with the full snapshot as
//!    `STATE` fragments, and reassembled snapshots are merged into the
//!    local replica.
//!
//! Everything is single-datagram best-effort: no acks, no retries. A lost
//! datagram is repaired by the next tick, and duplicated `STATE` is
//! harmless because merging is idempotent.

mod protocol;
mod reassembly;
mod service;

pub use protocol::{
    fragment_snapshot, GossipMessage, FRAGMENT_BYTES, MAX_DATAGRAM,
};
pub use reassembly::ReassemblyBuffer;
pub use service::{GossipConfig, GossipService, GossipStats};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, GossipError>;

/// Errors that can occur in gossip operations.
#[derive(Debug, thiserror::Error)]
pub enum GossipError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A fragment that contradicts what was already buffered.
    #[error("malformed fragment: {0}")]
    MalformedFragment(String),

    #[error(transparent)]
    Replica(#[from] edgemesh_replica::ReplicaError),
}
