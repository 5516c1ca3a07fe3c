//! The semantic replica state and its Merkle fingerprint.
//!
//! `SemanticState` is the CRDT triple that actually converges: the event
//! OR-Set, the named grow-only counters, and the named LWW registers.
//! The gateway folds node snapshots into a fresh `SemanticState` with the
//! same merge used node-side, so consolidation and gossip agree by
//! construction.

use edgemesh_crdt::{GCounter, LwwRegister, OrSet};
use edgemesh_types::{EventId, NodeId, Tag, TelemetryEvent};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Counter tracking how many events each node has ingested.
pub const EVENTS_TOTAL: &str = "events_total";

/// The mergeable portion of a replica.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SemanticState {
    /// All observed telemetry events.
    pub events: OrSet<TelemetryEvent>,
    /// Named grow-only counters (`events_total` at minimum).
    pub counters: BTreeMap<String, GCounter>,
    /// Latest reading per `"<type>@<location>"` key.
    pub registers: BTreeMap<String, LwwRegister>,
}

/// Counts returned by [`SemanticState::merge`], as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Events newly observed by this merge.
    pub new_events: usize,
    /// Register keys whose value changed.
    pub register_updates: usize,
    /// Counter slots that were raised.
    pub counter_updates: usize,
}

/// Full outcome of a merge, including which events were new.
#[derive(Debug, Clone)]
pub struct MergeDelta {
    /// Ids of events that were not present before the merge.
    pub new_event_ids: Vec<EventId>,
    /// Register keys whose value changed.
    pub register_updates: usize,
    /// Counter slots that were raised.
    pub counter_updates: usize,
}

impl MergeDelta {
    /// Condenses the delta into the wire-facing report.
    #[must_use]
    pub fn report(&self) -> MergeReport {
        MergeReport {
            new_events: self.new_event_ids.len(),
            register_updates: self.register_updates,
            counter_updates: self.counter_updates,
        }
    }

    /// True when the merge changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.new_event_ids.is_empty() && self.register_updates == 0 && self.counter_updates == 0
    }
}

/// Register key for a `(type, location)` pair.
#[must_use]
pub fn register_key(kind: &str, location: &str) -> String {
    format!("{kind}@{location}")
}

impl SemanticState {
    /// Applies a locally ingested (or replayed) event.
    ///
    /// Adds the event under its origin tag, publishes it as the latest
    /// reading for its `(type, location)` key, and counts it in
    /// `events_total`. Returns false (and changes nothing) when the tag is
    /// already present or tombstoned.
    pub fn apply_event(&mut self, event: &TelemetryEvent) -> bool {
        let tag = Tag::new(event.event_id, event.node_origin.clone());
        if !self.events.add(tag, event.clone()) {
            return false;
        }

        self.registers
            .entry(register_key(&event.kind, &event.location))
            .and_modify(|register| {
                register.write(event.value.clone(), event.timestamp_ms, &event.node_origin);
            })
            .or_insert_with(|| {
                LwwRegister::new(
                    event.value.clone(),
                    event.timestamp_ms,
                    event.node_origin.clone(),
                )
            });

        self.counters
            .entry(EVENTS_TOTAL.to_string())
            .or_default()
            .increment(&event.node_origin, 1);

        true
    }

    /// CRDT-merges another state into this one.
    pub fn merge(&mut self, other: &Self) -> MergeDelta {
        let before: Vec<EventId> = self.events.event_ids();
        self.events.merge(&other.events);
        let new_event_ids: Vec<EventId> = self
            .events
            .event_ids()
            .into_iter()
            .filter(|id| before.binary_search(id).is_err())
            .collect();

        let mut counter_updates = 0;
        for (key, counter) in &other.counters {
            counter_updates += self.counters.entry(key.clone()).or_default().merge(counter);
        }

        let mut register_updates = 0;
        for (key, register) in &other.registers {
            match self.registers.get_mut(key) {
                Some(existing) => {
                    if existing.merge(register) {
                        register_updates += 1;
                    }
                }
                None => {
                    self.registers.insert(key.clone(), register.clone());
                    register_updates += 1;
                }
            }
        }

        MergeDelta {
            new_event_ids,
            register_updates,
            counter_updates,
        }
    }

    /// Number of distinct live events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Live events, deduplicated and sorted by event id.
    #[must_use]
    pub fn sorted_events(&self) -> Vec<&TelemetryEvent> {
        let mut events = Vec::new();
        let mut last: Option<EventId> = None;
        for (tag, event) in self.events.iter() {
            if last != Some(tag.event_id) {
                events.push(event);
                last = Some(tag.event_id);
            }
        }
        events
    }

    /// SHA-256 fingerprint of the semantic state.
    ///
    /// Hashes the canonical serialization of (events sorted by id, counter
    /// entries, register entries by key). Insertion order and the log are
    /// invisible to it: equal roots mean semantically equal replicas.
    #[must_use]
    pub fn merkle_root(&self) -> [u8; 32] {
        #[derive(Serialize)]
        struct DigestView<'a> {
            events: Vec<&'a TelemetryEvent>,
            counters: &'a BTreeMap<String, GCounter>,
            registers: &'a BTreeMap<String, LwwRegister>,
        }

        let view = DigestView {
            events: self.sorted_events(),
            counters: &self.counters,
            registers: &self.registers,
        };
        let canonical = serde_json::to_vec(&view).expect("semantic state serializes");
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hasher.finalize().into()
    }

    /// Hex form of [`merkle_root`](Self::merkle_root).
    #[must_use]
    pub fn merkle_root_hex(&self) -> String {
        hex::encode(self.merkle_root())
    }

    /// The latest reading for a `(type, location)` key, if any.
    #[must_use]
    pub fn register(&self, kind: &str, location: &str) -> Option<&LwwRegister> {
        self.registers.get(&register_key(kind, location))
    }
}
