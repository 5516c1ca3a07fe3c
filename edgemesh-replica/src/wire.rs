//! Canonical snapshot form exchanged between processes.
//!
//! `ReplicaWire` is what gossip fragments carry and what the gateway
//! fetches from `/state/snapshot`. All maps are ordered and the adds list
//! is sorted by tag, so serializing the same semantic state always yields
//! the same bytes.

use crate::semantic::SemanticState;
use crate::{ReplicaError, Result};
use edgemesh_crdt::{GCounter, LwwRegister, OrSet};
use edgemesh_types::{NodeId, Tag, TelemetryEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire form of the event OR-Set: `[[tag, event], ...]` plus tombstones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSetWire {
    /// Live add-tags with their events, sorted by tag.
    pub adds: Vec<(Tag, TelemetryEvent)>,
    /// Tombstoned tags, sorted.
    pub removes: Vec<Tag>,
}

/// A full replica snapshot in canonical key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaWire {
    /// The node this snapshot was taken from.
    pub node_id: NodeId,
    /// The node's local-mutation counter at snapshot time.
    pub version: u64,
    /// The event OR-Set.
    pub events: EventSetWire,
    /// Named grow-only counters.
    pub counters: BTreeMap<String, GCounter>,
    /// Named LWW registers.
    pub registers: BTreeMap<String, LwwRegister>,
    /// Hex Merkle root of the semantic state above.
    pub merkle_root: String,
}

impl ReplicaWire {
    /// Builds a snapshot from a semantic state.
    #[must_use]
    pub fn from_state(node_id: NodeId, version: u64, state: &SemanticState) -> Self {
        let root = state.merkle_root_hex();
        Self::from_state_with_root(node_id, version, state, root)
    }

    /// Like [`from_state`](Self::from_state) with an already-computed root.
    #[must_use]
    pub fn from_state_with_root(
        node_id: NodeId,
        version: u64,
        state: &SemanticState,
        merkle_root: String,
    ) -> Self {
        Self {
            node_id,
            version,
            events: EventSetWire {
                adds: state
                    .events
                    .iter()
                    .map(|(tag, event)| (tag.clone(), event.clone()))
                    .collect(),
                removes: state.events.removes().iter().cloned().collect(),
            },
            counters: state.counters.clone(),
            registers: state.registers.clone(),
            merkle_root,
        }
    }

    /// Checks structural invariants a well-formed snapshot must hold.
    pub fn validate(&self) -> Result<()> {
        if self.node_id.as_str().is_empty() {
            return Err(ReplicaError::InvalidReplica("empty node_id".to_string()));
        }
        if self.merkle_root.len() != 64 || !self.merkle_root.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(ReplicaError::InvalidReplica(format!(
                "malformed merkle_root {:?}",
                self.merkle_root
            )));
        }
        for (tag, event) in &self.events.adds {
            if tag.event_id != event.event_id {
                return Err(ReplicaError::InvalidReplica(format!(
                    "tag {tag} does not match event {}",
                    event.event_id
                )));
            }
        }
        Ok(())
    }

    /// Reconstructs the mergeable state this snapshot describes.
    ///
    /// Validates first; a nonsense snapshot yields
    /// [`ReplicaError::InvalidReplica`].
    pub fn to_state(&self) -> Result<SemanticState> {
        self.validate()?;
        let events = OrSet::from_parts(
            self.events
                .adds
                .iter()
                .map(|(tag, event)| (tag.clone(), event.clone())),
            self.events.removes.iter().cloned().collect(),
        );
        Ok(SemanticState {
            events,
            counters: self.counters.clone(),
            registers: self.registers.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn populated_state() -> SemanticState {
        let mut state = SemanticState::default();
        state.apply_event(&TelemetryEvent::new(
            NodeId::new("node1"),
            "water_level",
            json!(3.2),
            "bridge_north",
            BTreeMap::new(),
        ));
        state.apply_event(&TelemetryEvent::new(
            NodeId::new("node1"),
            "road_status",
            json!("blocked"),
            "highway_101",
            BTreeMap::new(),
        ));
        state
    }

    #[test]
    fn wire_roundtrip_preserves_state() {
        let state = populated_state();
        let wire = ReplicaWire::from_state(NodeId::new("node1"), 2, &state);
        let rebuilt = wire.to_state().unwrap();
        assert_eq!(rebuilt, state);
        assert_eq!(rebuilt.merkle_root_hex(), wire.merkle_root);
    }

    #[test]
    fn wire_json_roundtrip() {
        let state = populated_state();
        let wire = ReplicaWire::from_state(NodeId::new("node1"), 2, &state);
        let json = serde_json::to_string(&wire).unwrap();
        let parsed: ReplicaWire = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, wire);
    }

    #[test]
    fn validate_rejects_bad_root() {
        let state = populated_state();
        let mut wire = ReplicaWire::from_state(NodeId::new("node1"), 2, &state);
        wire.merkle_root = "not-hex".to_string();
        assert!(matches!(
            wire.validate(),
            Err(ReplicaError::InvalidReplica(_))
        ));
    }

    #[test]
    fn validate_rejects_mismatched_tag() {
        let state = populated_state();
        let mut wire = ReplicaWire::from_state(NodeId::new("node1"), 2, &state);
        wire.events.adds[0].0 = Tag::new(edgemesh_types::EventId::new(), NodeId::new("node1"));
        assert!(wire.validate().is_err());
    }

    #[test]
    fn canonical_serialization_is_stable() {
        let state = populated_state();
        let a = ReplicaWire::from_state(NodeId::new("node1"), 2, &state);
        let b = ReplicaWire::from_state(NodeId::new("node1"), 2, &state.clone());
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
