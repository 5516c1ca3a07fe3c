//! Observed-Remove Set (OR-Set / Add-Wins Set).
//!
//! A CRDT set with add-wins semantics: if an element is concurrently added
//! on one replica and removed on another, the add survives, because a remove
//! only tombstones the tags it has actually observed.
//!
//! Tags here are deterministic — `(event_id, node_id)` — rather than random:
//! re-adding the same event from the same node is a no-op, which gives
//! intake its duplicate-id idempotence.
//!
//! Invariant: `adds` only ever holds live tags. Tombstoned tags are removed
//! eagerly on every mutation, and a tombstoned tag is never resurrected.

use edgemesh_types::{EventId, Tag};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An Observed-Remove Set keyed by add-tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrSet<T> {
    /// Live add-tags and the element each one observes.
    adds: BTreeMap<Tag, T>,
    /// All removed tags (tombstones).
    removes: BTreeSet<Tag>,
}

impl<T> Default for OrSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrSet<T> {
    /// Creates a new empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            adds: BTreeMap::new(),
            removes: BTreeSet::new(),
        }
    }

    /// Rebuilds a set from its wire parts. Tombstoned adds are dropped.
    #[must_use]
    pub fn from_parts(adds: impl IntoIterator<Item = (Tag, T)>, removes: BTreeSet<Tag>) -> Self {
        let adds = adds
            .into_iter()
            .filter(|(tag, _)| !removes.contains(tag))
            .collect();
        Self { adds, removes }
    }

    /// Adds an element under the given tag.
    ///
    /// Returns true if the tag was newly inserted; false if it already
    /// exists or was tombstoned earlier.
    pub fn add(&mut self, tag: Tag, element: T) -> bool {
        if self.removes.contains(&tag) || self.adds.contains_key(&tag) {
            return false;
        }
        self.adds.insert(tag, element);
        true
    }

    /// Tombstones every observed tag for an element.
    ///
    /// Concurrent adds under fresh tags survive (add-wins). Returns the
    /// tags that were removed.
    pub fn remove(&mut self, event_id: EventId) -> Vec<Tag> {
        let doomed: Vec<Tag> = self
            .adds
            .keys()
            .filter(|tag| tag.event_id == event_id)
            .cloned()
            .collect();
        for tag in &doomed {
            self.adds.remove(tag);
            self.removes.insert(tag.clone());
        }
        doomed
    }

    /// Returns true if the tag is live.
    #[must_use]
    pub fn contains_tag(&self, tag: &Tag) -> bool {
        self.adds.contains_key(tag)
    }

    /// Returns true if the element has at least one live tag.
    #[must_use]
    pub fn contains_event(&self, event_id: EventId) -> bool {
        // Tags sort by event id first, so all tags for one event are
        // contiguous; range over that prefix.
        self.adds.keys().any(|tag| tag.event_id == event_id)
    }

    /// Returns the element recorded for an event id, if live.
    #[must_use]
    pub fn get(&self, event_id: EventId) -> Option<&T> {
        self.adds
            .iter()
            .find(|(tag, _)| tag.event_id == event_id)
            .map(|(_, element)| element)
    }

    /// Number of distinct live elements.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut last: Option<EventId> = None;
        for tag in self.adds.keys() {
            if last != Some(tag.event_id) {
                count += 1;
                last = Some(tag.event_id);
            }
        }
        count
    }

    /// Returns true if no element is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty()
    }

    /// Iterates over live `(tag, element)` pairs in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &T)> {
        self.adds.iter()
    }

    /// Distinct live event ids, in order.
    pub fn event_ids(&self) -> Vec<EventId> {
        let mut ids: Vec<EventId> = self.adds.keys().map(|tag| tag.event_id).collect();
        ids.dedup();
        ids
    }

    /// The tombstone set.
    #[must_use]
    pub fn removes(&self) -> &BTreeSet<Tag> {
        &self.removes
    }
}

impl<T: Clone> OrSet<T> {
    /// Merges another OR-Set into this one.
    ///
    /// Union of adds, union of tombstones, then every tombstoned tag is
    /// dropped from the live map.
    pub fn merge(&mut self, other: &Self) {
        self.removes.extend(other.removes.iter().cloned());

        for (tag, element) in &other.adds {
            if !self.removes.contains(tag) && !self.adds.contains_key(tag) {
                self.adds.insert(tag.clone(), element.clone());
            }
        }

        let removes = &self.removes;
        self.adds.retain(|tag, _| !removes.contains(tag));
    }

    /// Creates a new set that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}
