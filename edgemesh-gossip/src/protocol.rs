//! Gossip wire messages.
//!
//! Every datagram is one JSON-encoded [`GossipMessage`]. The envelope is
//! `{msg, node_id, version}` plus type-specific fields; `msg` is the serde
//! tag. Snapshots larger than one datagram are split into `STATE`
//! fragments whose base64 payloads concatenate back into the snapshot
//! JSON.

use crate::{GossipError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use edgemesh_replica::ReplicaWire;
use edgemesh_types::NodeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard cap on datagram size.
pub const MAX_DATAGRAM: usize = 8 * 1024;

/// Raw bytes per `STATE` fragment, sized so the base64 payload plus the
/// JSON envelope stays under [`MAX_DATAGRAM`].
pub const FRAGMENT_BYTES: usize = 4096;

/// A gossip datagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg")]
pub enum GossipMessage {
    /// Periodic convergence probe.
    #[serde(rename = "DIGEST")]
    Digest {
        node_id: NodeId,
        version: u64,
        merkle_root: String,
    },

    /// "Your digest differs from mine — send me your snapshot."
    #[serde(rename = "PULL_REQ")]
    PullReq {
        node_id: NodeId,
        version: u64,
        since_version: u64,
    },

    /// One fragment of a snapshot.
    #[serde(rename = "STATE")]
    State {
        node_id: NodeId,
        version: u64,
        frag_id: Uuid,
        index: u16,
        total: u16,
        payload: String,
    },
}

impl GossipMessage {
    /// Encodes for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a received datagram.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Splits a snapshot into `STATE` fragments ready to send.
pub fn fragment_snapshot(wire: &ReplicaWire) -> Result<Vec<GossipMessage>> {
    let bytes = serde_json::to_vec(wire)?;
    let chunks: Vec<&[u8]> = bytes.chunks(FRAGMENT_BYTES).collect();
    let total = u16::try_from(chunks.len().max(1)).map_err(|_| {
        GossipError::MalformedFragment(format!("snapshot needs {} fragments", chunks.len()))
    })?;

    let frag_id = Uuid::new_v4();
    let fragments = chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| GossipMessage::State {
            node_id: wire.node_id.clone(),
            version: wire.version,
            frag_id,
            index: index as u16,
            total,
            payload: BASE64.encode(chunk),
        })
        .collect();
    Ok(fragments)
}
