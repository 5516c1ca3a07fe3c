//! Property-based tests for replica-level merge laws.
//!
//! Equivalence here is what the fleet actually compares: equal Merkle
//! roots. Whatever events each replica ingested, merging must be
//! commutative, associative, and idempotent under that fingerprint.

use edgemesh_replica::SemanticState;
use edgemesh_types::{EventId, NodeId, TelemetryEvent};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct EventSpec {
    id: u128,
    node: &'static str,
    kind: &'static str,
    location: &'static str,
    ts_ms: u64,
}

fn event_spec() -> impl Strategy<Value = EventSpec> {
    (
        any::<u128>(),
        prop::sample::select(vec!["node1", "node2", "node3"]),
        prop::sample::select(vec!["water_level", "injured_count", "road_status"]),
        prop::sample::select(vec!["bridge_north", "shelter_east", "highway_101"]),
        1u64..1_000_000,
    )
        .prop_map(|(id, node, kind, location, ts_ms)| EventSpec {
            id,
            node,
            kind,
            location,
            ts_ms,
        })
}

fn materialize(spec: &EventSpec) -> TelemetryEvent {
    TelemetryEvent {
        event_id: EventId::from_uuid(Uuid::from_u128(spec.id)),
        node_origin: NodeId::new(spec.node),
        kind: spec.kind.to_string(),
        // Deterministic in the stamp: writes with equal (ts, node) stamps
        // must carry equal values, or last-writer-wins has no winner.
        value: json!((spec.ts_ms % 997) as i64),
        location: spec.location.to_string(),
        metadata: BTreeMap::new(),
        timestamp_ms: spec.ts_ms,
    }
}

fn state_strategy() -> impl Strategy<Value = SemanticState> {
    prop::collection::vec(event_spec(), 0..10).prop_map(|specs| {
        let mut state = SemanticState::default();
        for spec in &specs {
            state.apply_event(&materialize(spec));
        }
        state
    })
}

proptest! {
    #[test]
    fn merge_is_commutative(a in state_strategy(), b in state_strategy()) {
        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        prop_assert_eq!(ab.merkle_root(), ba.merkle_root());
    }

    #[test]
    fn merge_is_associative(
        a in state_strategy(),
        b in state_strategy(),
        c in state_strategy(),
    ) {
        let mut left = a.clone();
        {
            let mut bc = b.clone();
            bc.merge(&c);
            left.merge(&bc);
        }

        let mut right = a.clone();
        right.merge(&b);
        right.merge(&c);

        prop_assert_eq!(left.merkle_root(), right.merkle_root());
    }

    #[test]
    fn merge_is_idempotent(a in state_strategy()) {
        let mut merged = a.clone();
        merged.merge(&a);
        prop_assert_eq!(merged.merkle_root(), a.merkle_root());
    }

    /// Equal fingerprints mean semantically equal replicas.
    #[test]
    fn equal_roots_imply_equal_state(a in state_strategy(), b in state_strategy()) {
        if a.merkle_root() == b.merkle_root() {
            prop_assert_eq!(a.sorted_events(), b.sorted_events());
            prop_assert_eq!(&a.counters, &b.counters);
            prop_assert_eq!(&a.registers, &b.registers);
        }
    }
}
