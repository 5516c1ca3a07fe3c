//! Property-based tests for CRDT correctness.
//!
//! These verify the merge laws every CRDT in the crate must satisfy:
//! - Commutativity: merge(A, B) == merge(B, A)
//! - Associativity: merge(merge(A, B), C) == merge(A, merge(B, C))
//! - Idempotence: merge(A, A) == A

use edgemesh_crdt::{GCounter, LwwRegister, OrSet};
use edgemesh_types::{EventId, NodeId, Tag};
use proptest::prelude::*;
use serde_json::json;
use uuid::Uuid;

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn node_id_strategy() -> impl Strategy<Value = NodeId> {
    prop::sample::select(vec!["node1", "node2", "node3", "edge-a", "edge-b"])
        .prop_map(NodeId::new)
}

fn event_id_strategy() -> impl Strategy<Value = EventId> {
    any::<u128>().prop_map(|raw| EventId::from_uuid(Uuid::from_u128(raw)))
}

fn tag_strategy() -> impl Strategy<Value = Tag> {
    (event_id_strategy(), node_id_strategy()).prop_map(|(event, node)| Tag::new(event, node))
}

fn gcounter_strategy() -> impl Strategy<Value = GCounter> {
    prop::collection::vec((node_id_strategy(), 0u64..1000), 0..8).prop_map(|slots| {
        let mut counter = GCounter::new();
        for (node, amount) in slots {
            counter.increment(&node, amount);
        }
        counter
    })
}

fn register_strategy() -> impl Strategy<Value = LwwRegister> {
    (any::<i32>(), 1u64..1_000_000, node_id_strategy())
        .prop_map(|(value, ts_ms, node)| LwwRegister::new(json!(value), ts_ms, node))
}

fn orset_strategy() -> impl Strategy<Value = OrSet<i32>> {
    prop::collection::vec((tag_strategy(), any::<i32>(), any::<bool>()), 0..12).prop_map(|ops| {
        let mut set = OrSet::new();
        for (tag, element, remove_after) in ops {
            let event = tag.event_id;
            set.add(tag, element);
            if remove_after {
                set.remove(event);
            }
        }
        set
    })
}

// =============================================================================
// GCOUNTER
// =============================================================================

proptest! {
    #[test]
    fn gcounter_merge_is_commutative(a in gcounter_strategy(), b in gcounter_strategy()) {
        prop_assert_eq!(a.merged(&b), b.merged(&a));
    }

    #[test]
    fn gcounter_merge_is_associative(
        a in gcounter_strategy(),
        b in gcounter_strategy(),
        c in gcounter_strategy(),
    ) {
        prop_assert_eq!(a.merged(&b).merged(&c), a.merged(&b.merged(&c)));
    }

    #[test]
    fn gcounter_merge_is_idempotent(a in gcounter_strategy()) {
        prop_assert_eq!(a.merged(&a), a);
    }

    #[test]
    fn gcounter_merge_never_loses_counts(a in gcounter_strategy(), b in gcounter_strategy()) {
        let merged = a.merged(&b);
        prop_assert!(merged.value() >= a.value().max(b.value()));
    }
}

// =============================================================================
// LWW REGISTER
// =============================================================================

proptest! {
    #[test]
    fn register_merge_is_commutative(a in register_strategy(), b in register_strategy()) {
        prop_assert_eq!(a.merged(&b), b.merged(&a));
    }

    #[test]
    fn register_merge_is_associative(
        a in register_strategy(),
        b in register_strategy(),
        c in register_strategy(),
    ) {
        prop_assert_eq!(a.merged(&b).merged(&c), a.merged(&b.merged(&c)));
    }

    #[test]
    fn register_merge_is_idempotent(a in register_strategy()) {
        prop_assert_eq!(a.merged(&a), a.clone());
    }

    #[test]
    fn register_winner_has_greatest_stamp(a in register_strategy(), b in register_strategy()) {
        let merged = a.merged(&b);
        let greatest = if (b.ts_ms, &b.node_id) > (a.ts_ms, &a.node_id) { &b } else { &a };
        prop_assert_eq!(&merged.ts_ms, &greatest.ts_ms);
        prop_assert_eq!(&merged.node_id, &greatest.node_id);
    }
}

// =============================================================================
// OR-SET
// =============================================================================

proptest! {
    #[test]
    fn orset_merge_is_commutative(a in orset_strategy(), b in orset_strategy()) {
        prop_assert_eq!(a.merged(&b), b.merged(&a));
    }

    #[test]
    fn orset_merge_is_associative(
        a in orset_strategy(),
        b in orset_strategy(),
        c in orset_strategy(),
    ) {
        prop_assert_eq!(a.merged(&b).merged(&c), a.merged(&b.merged(&c)));
    }

    #[test]
    fn orset_merge_is_idempotent(a in orset_strategy()) {
        prop_assert_eq!(a.merged(&a), a.clone());
    }

    #[test]
    fn orset_tombstones_only_grow(a in orset_strategy(), b in orset_strategy()) {
        let merged = a.merged(&b);
        for tag in a.removes() {
            prop_assert!(merged.removes().contains(tag));
            prop_assert!(!merged.contains_tag(tag));
        }
    }

    /// Full-mesh exchange converges all replicas to one state.
    #[test]
    fn orset_three_replica_convergence(
        a in orset_strategy(),
        b in orset_strategy(),
        c in orset_strategy(),
    ) {
        let (sa, sb, sc) = (a.clone(), b.clone(), c.clone());
        let mut a = a;
        let mut b = b;
        let mut c = c;

        a.merge(&sb);
        a.merge(&sc);
        b.merge(&sa);
        b.merge(&sc);
        c.merge(&sa);
        c.merge(&sb);

        prop_assert_eq!(&a, &b);
        prop_assert_eq!(&b, &c);
    }
}
