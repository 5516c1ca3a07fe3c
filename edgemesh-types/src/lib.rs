//! Core type definitions for edgemesh.
//!
//! This crate defines the fundamental types shared by every edge node and
//! the gateway:
//! - Node and event identifiers
//! - Add-tags (`"<event_id>@<node_id>"`) used by the replicated event set
//! - Telemetry events (the unit of replication)
//! - Wall-clock millisecond helpers
//!
//! Everything network- or storage-specific (wire snapshots, gossip frames,
//! chain records) belongs to the crates that own those concerns, not here.

mod clock;
mod event;
mod ids;

pub use clock::now_ms;
pub use event::TelemetryEvent;
pub use ids::{EventId, NodeId, Tag};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid tag: {0}")]
    InvalidTag(String),
}
