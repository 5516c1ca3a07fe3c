//! Snapshot consolidation.
//!
//! The gateway folds all fetched snapshots into one consolidated replica
//! using the same CRDT merge the nodes use, so the merged view is exactly
//! what any node would hold after seeing everything. The consolidated
//! state is rebuilt from scratch every poll — nothing is carried over.

use edgemesh_replica::{ReplicaWire, SemanticState};
use edgemesh_types::NodeId;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// The consolidated view of one poll round.
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    /// The consolidated replica.
    pub merged_state: ReplicaWire,
    /// Root each node reported, keyed by node id.
    pub per_node_roots: BTreeMap<NodeId, String>,
    /// Root of the consolidated replica.
    pub merged_root: String,
}

/// Folds fetched snapshots into a fresh consolidated replica.
///
/// Snapshots that fail structural validation are skipped (and logged);
/// a single bad node must not blind the gateway to the rest.
#[must_use]
pub fn merge_snapshots(snapshots: &[ReplicaWire]) -> MergeOutcome {
    let mut consolidated = SemanticState::default();
    let mut per_node_roots = BTreeMap::new();

    for wire in snapshots {
        match wire.to_state() {
            Ok(state) => {
                per_node_roots.insert(wire.node_id.clone(), wire.merkle_root.clone());
                consolidated.merge(&state);
            }
            Err(err) => {
                warn!(node_id = %wire.node_id, %err, "skipping invalid snapshot");
            }
        }
    }

    let merged_root = consolidated.merkle_root_hex();
    MergeOutcome {
        merged_state: ReplicaWire::from_state_with_root(
            NodeId::new("gateway"),
            0,
            &consolidated,
            merged_root.clone(),
        ),
        per_node_roots,
        merged_root,
    }
}
