//! Last-Writer-Wins register CRDT.
//!
//! Stores a single JSON value together with the `(wall_ms, node_id)` stamp
//! of the write that produced it. Concurrent writes are resolved by taking
//! the lexicographically greater stamp, so every replica picks the same
//! winner; ties on the millisecond go to the greater node id.
//!
//! Nodes publish their current "latest reading" per `(type, location)` key
//! through these registers.

use edgemesh_types::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Last-Writer-Wins register.
///
/// Field order matches the snapshot wire form:
/// `{"value": ..., "ts_ms": ..., "node_id": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LwwRegister {
    /// The current value.
    pub value: Value,
    /// Wall-clock milliseconds of the winning write.
    pub ts_ms: u64,
    /// Node that performed the winning write.
    pub node_id: NodeId,
}

impl LwwRegister {
    /// Creates a register holding the given write.
    #[must_use]
    pub fn new(value: Value, ts_ms: u64, node_id: NodeId) -> Self {
        Self {
            value,
            ts_ms,
            node_id,
        }
    }

    /// Whether an incoming write should win over the current one.
    ///
    /// Strict comparison on `(ts_ms, node_id)` — equal stamps lose, which
    /// is what makes merge idempotent.
    #[must_use]
    pub fn should_update(&self, ts_ms: u64, node_id: &NodeId) -> bool {
        (ts_ms, node_id) > (self.ts_ms, &self.node_id)
    }

    /// Applies a local write.
    ///
    /// Accepts equal stamps from the same node so that two writes within
    /// the same millisecond keep the later value. Returns true if the
    /// register changed.
    pub fn write(&mut self, value: Value, ts_ms: u64, node_id: &NodeId) -> bool {
        let same_slot = ts_ms == self.ts_ms && *node_id == self.node_id;
        if self.should_update(ts_ms, node_id) || same_slot {
            self.value = value;
            self.ts_ms = ts_ms;
            self.node_id = node_id.clone();
            true
        } else {
            false
        }
    }

    /// Merges another register into this one.
    ///
    /// The write with the greater `(ts_ms, node_id)` stamp wins. Returns
    /// true if the other register's write won.
    pub fn merge(&mut self, other: &Self) -> bool {
        if self.should_update(other.ts_ms, &other.node_id) {
            self.value = other.value.clone();
            self.ts_ms = other.ts_ms;
            self.node_id = other.node_id.clone();
            true
        } else {
            false
        }
    }

    /// Returns a new register that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}
