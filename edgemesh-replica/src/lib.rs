//! Per-node replica for edgemesh.
//!
//! A replica is the unit of convergence: the CRDT state every node carries,
//! plus the node's private audit trail and the fingerprint used to compare
//! replicas cheaply.
//!
//! # Components
//!
//! - **SemanticState**: the CRDT triple — event OR-Set, named grow-only
//!   counters, named LWW registers. This is what merges and what the
//!   Merkle digest covers.
//! - **HashChainLog**: append-only, tamper-evident ledger of local
//!   ingestions and applied merges. Private to each node; never merged.
//! - **ReplicaStore**: owns both behind a single mutex so version bump,
//!   log append, and digest invalidation are atomic with respect to readers.
//! - **ReplicaWire**: the canonical JSON snapshot exchanged over gossip and
//!   fetched by the gateway.
//!
//! The digest deliberately covers only the semantic state: two nodes that
//! reached the same state through different ingestion orders have different
//! logs but identical fingerprints.

mod hash_chain;
mod semantic;
mod store;
mod wire;

pub use hash_chain::{ChainRecord, HashChainLog, LogAudit, LogEntry, GENESIS_PREV_HASH};
pub use semantic::{register_key, MergeDelta, MergeReport, SemanticState, EVENTS_TOTAL};
pub use store::{EventDraft, ReplicaStore};
pub use wire::{EventSetWire, ReplicaWire};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, ReplicaError>;

/// Errors that can occur in replica operations.
#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    /// A merge input that doesn't describe a well-formed replica.
    #[error("invalid replica: {0}")]
    InvalidReplica(String),

    /// The on-disk log failed hash-chain verification.
    #[error("log corruption at seq {seq}")]
    LogCorruption { seq: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
