//! Grow-only counter CRDT.
//!
//! Each node increments its own slot; the counter value is the sum over all
//! slots. Merge takes the per-node maximum, so replaying or reordering
//! merges can never lose or double-count an increment.

use edgemesh_types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A grow-only counter.
///
/// Serializes as a plain `{node_id: count}` map, which is exactly the wire
/// form the snapshot format uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GCounter {
    counts: BTreeMap<NodeId, u64>,
}

impl GCounter {
    /// Creates a new counter with value 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the slot for the given node by `amount`.
    ///
    /// A node must only ever increment its own slot; merges are the only
    /// way another node's count enters a replica.
    pub fn increment(&mut self, node_id: &NodeId, amount: u64) {
        *self.counts.entry(node_id.clone()).or_insert(0) += amount;
    }

    /// Returns the counter value: the sum of all slots.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Returns the count recorded for one node.
    #[must_use]
    pub fn get(&self, node_id: &NodeId) -> u64 {
        self.counts.get(node_id).copied().unwrap_or(0)
    }

    /// Iterates over `(node, count)` slots in node-id order.
    pub fn entries(&self) -> impl Iterator<Item = (&NodeId, u64)> {
        self.counts.iter().map(|(node, &count)| (node, count))
    }

    /// Merges another counter into this one (per-node max).
    ///
    /// Returns the number of slots that were raised.
    pub fn merge(&mut self, other: &Self) -> usize {
        let mut raised = 0;
        for (node_id, &count) in &other.counts {
            let entry = self.counts.entry(node_id.clone()).or_insert(0);
            if count > *entry {
                *entry = count;
                raised += 1;
            }
        }
        raised
    }

    /// Returns a new counter that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: &str) -> NodeId {
        NodeId::new(n)
    }

    #[test]
    fn new_counter_is_zero() {
        assert_eq!(GCounter::new().value(), 0);
    }

    #[test]
    fn increment_accumulates_per_node() {
        let mut c = GCounter::new();
        c.increment(&node("a"), 2);
        c.increment(&node("a"), 3);
        c.increment(&node("b"), 1);
        assert_eq!(c.value(), 6);
        assert_eq!(c.get(&node("a")), 5);
        assert_eq!(c.get(&node("b")), 1);
    }

    #[test]
    fn merge_takes_per_node_max() {
        let mut a = GCounter::new();
        a.increment(&node("a"), 5);

        let mut b = GCounter::new();
        b.increment(&node("a"), 3);
        b.increment(&node("b"), 7);

        let merged = a.merged(&b);
        assert_eq!(merged.get(&node("a")), 5);
        assert_eq!(merged.get(&node("b")), 7);
        assert_eq!(merged.value(), 12);
    }

    #[test]
    fn merge_is_commutative() {
        let mut a = GCounter::new();
        a.increment(&node("a"), 4);
        let mut b = GCounter::new();
        b.increment(&node("b"), 9);

        assert_eq!(a.merged(&b), b.merged(&a));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut a = GCounter::new();
        a.increment(&node("a"), 4);
        assert_eq!(a.merged(&a), a);
    }

    #[test]
    fn merge_reports_raised_slots() {
        let mut a = GCounter::new();
        a.increment(&node("a"), 5);

        let mut b = GCounter::new();
        b.increment(&node("a"), 3);
        b.increment(&node("b"), 1);

        // a's slot for "a" already dominates; only "b" is new.
        assert_eq!(a.merge(&b), 1);
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut c = GCounter::new();
        c.increment(&node("node1"), 3);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"node1":3}"#);
    }
}
