//! Divergence tracking.
//!
//! After every poll the gateway records which Merkle roots the reachable
//! nodes reported. More than one distinct root among reachable nodes means
//! the fleet has diverged. Records live in a bounded ring; the newest 200
//! observations are enough to see any partition episode play out.

use edgemesh_types::{now_ms, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

/// Observations kept.
pub const DIVERGENCE_RING_CAP: usize = 200;

/// One convergence observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceRecord {
    /// When the observation was made.
    pub timestamp_ms: u64,
    /// True when reachable nodes reported more than one distinct root.
    pub is_divergent: bool,
    /// Root reported by each reachable node.
    pub merkle_roots: BTreeMap<NodeId, String>,
    /// The nodes that answered this poll.
    pub reachable_node_ids: Vec<NodeId>,
}

/// Ring of recent divergence observations.
#[derive(Default)]
pub struct DivergenceTracker {
    ring: Mutex<VecDeque<DivergenceRecord>>,
}

impl DivergenceTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observation.
    ///
    /// Returns the new record and whether this observation is a
    /// divergent → synced transition (a convergence event).
    pub fn record(
        &self,
        merkle_roots: BTreeMap<NodeId, String>,
        reachable_node_ids: Vec<NodeId>,
    ) -> (DivergenceRecord, bool) {
        let distinct: BTreeSet<&String> = merkle_roots.values().collect();
        let record = DivergenceRecord {
            timestamp_ms: now_ms(),
            is_divergent: distinct.len() > 1,
            merkle_roots,
            reachable_node_ids,
        };

        let mut ring = self.ring.lock().expect("divergence lock");
        let was_divergent = ring.back().map(|prev| prev.is_divergent).unwrap_or(false);
        let converged_now = was_divergent && !record.is_divergent;
        if ring.len() == DIVERGENCE_RING_CAP {
            ring.pop_front();
        }
        ring.push_back(record.clone());
        (record, converged_now)
    }

    /// The most recent observation.
    #[must_use]
    pub fn latest(&self) -> Option<DivergenceRecord> {
        self.ring.lock().expect("divergence lock").back().cloned()
    }

    /// All retained observations, newest first.
    #[must_use]
    pub fn log(&self) -> Vec<DivergenceRecord> {
        let ring = self.ring.lock().expect("divergence lock");
        ring.iter().rev().cloned().collect()
    }

    /// Seconds the fleet has been divergent: 0 when the latest
    /// observation is synced, otherwise the age of the most recent synced
    /// observation (or of the oldest record if none is synced).
    #[must_use]
    pub fn divergence_duration_seconds(&self) -> u64 {
        let ring = self.ring.lock().expect("divergence lock");
        let Some(latest) = ring.back() else {
            return 0;
        };
        if !latest.is_divergent {
            return 0;
        }
        let since_ms = ring
            .iter()
            .rev()
            .find(|record| !record.is_divergent)
            .map(|record| record.timestamp_ms)
            .or_else(|| ring.front().map(|record| record.timestamp_ms))
            .unwrap_or_else(now_ms);
        now_ms().saturating_sub(since_ms) / 1000
    }
}
