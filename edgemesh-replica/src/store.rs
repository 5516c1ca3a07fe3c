//! The replica store: single owner of a node's mutable state.
//!
//! Every mutation — intake, inbound merge — runs under one mutex, so the
//! version bump, the log append, and the digest invalidation are atomic
//! with respect to readers. Reads briefly take the same mutex and return
//! owned copies.

use crate::hash_chain::{ChainRecord, HashChainLog, LogAudit, LogEntry};
use crate::semantic::{MergeReport, SemanticState};
use crate::wire::ReplicaWire;
use crate::Result;
use edgemesh_types::{NodeId, TelemetryEvent};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Fields of an event before the store assigns identity.
#[derive(Debug, Clone)]
pub struct EventDraft {
    /// Reading type, e.g. `water_level`.
    pub kind: String,
    /// The reading (JSON scalar).
    pub value: Value,
    /// Where the reading was taken.
    pub location: String,
    /// Free-form annotations.
    pub metadata: BTreeMap<String, Value>,
}

struct StoreInner {
    state: SemanticState,
    log: HashChainLog,
    /// Counts local mutations only; merges never bump it.
    version: u64,
    /// Cached Merkle root; `None` after any mutation.
    cached_root: Option<[u8; 32]>,
}

impl StoreInner {
    fn root(&mut self) -> [u8; 32] {
        match self.cached_root {
            Some(root) => root,
            None => {
                let root = self.state.merkle_root();
                self.cached_root = Some(root);
                root
            }
        }
    }
}

/// A node's replica: CRDT state + hash-chain log behind one mutex.
pub struct ReplicaStore {
    node_id: NodeId,
    inner: Mutex<StoreInner>,
}

impl ReplicaStore {
    /// Creates a store with no backing file (tests, ephemeral nodes).
    #[must_use]
    pub fn in_memory(node_id: NodeId) -> Self {
        Self {
            node_id,
            inner: Mutex::new(StoreInner {
                state: SemanticState::default(),
                log: HashChainLog::in_memory(),
                version: 0,
                cached_root: None,
            }),
        }
    }

    /// Opens a store backed by a log file, replaying prior history.
    ///
    /// The stored chain is verified before anything else happens; a
    /// corrupted log refuses to start. CRDTs are rebuilt from the
    /// `EVENT_INGESTED` records — merged-in events are not persisted and
    /// will be re-learned from peers.
    pub async fn open(node_id: NodeId, log_path: impl AsRef<Path>) -> Result<Self> {
        let log = HashChainLog::open(log_path).await?;

        let mut state = SemanticState::default();
        let mut version = 0;
        for record in log.records() {
            if let LogEntry::EventIngested { event } = &record.entry {
                state.apply_event(event);
                version += 1;
            }
        }

        if !log.is_empty() {
            info!(
                node_id = %node_id,
                records = log.len(),
                replayed_events = version,
                "replica log replayed"
            );
        }

        Ok(Self {
            node_id,
            inner: Mutex::new(StoreInner {
                state,
                log,
                version,
                cached_root: None,
            }),
        })
    }

    /// The node this store belongs to.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Ingests a new event: assigns identity, updates all three CRDTs,
    /// appends `EVENT_INGESTED`, bumps the version.
    ///
    /// Returns the stored event and the new Merkle root (hex).
    pub async fn ingest(&self, draft: EventDraft) -> Result<(TelemetryEvent, String)> {
        let event = TelemetryEvent::new(
            self.node_id.clone(),
            draft.kind,
            draft.value,
            draft.location,
            draft.metadata,
        );

        let mut inner = self.inner.lock().await;
        if !inner.state.apply_event(&event) {
            // Duplicate tag: nothing changed, report the current root.
            let root = hex::encode(inner.root());
            return Ok((event, root));
        }
        inner
            .log
            .append(LogEntry::EventIngested {
                event: event.clone(),
            })
            .await?;
        inner.version += 1;
        inner.cached_root = None;
        let root = hex::encode(inner.root());
        debug!(node_id = %self.node_id, event_id = %event.event_id, "event ingested");
        Ok((event, root))
    }

    /// Merges a peer snapshot into this replica.
    ///
    /// Appends a `MERGE_APPLIED` record per newly observed event. The
    /// version is untouched — it counts local mutations only — but the
    /// digest cache is always invalidated.
    pub async fn merge(&self, wire: &ReplicaWire) -> Result<MergeReport> {
        let other = wire.to_state()?;

        let mut inner = self.inner.lock().await;
        let delta = inner.state.merge(&other);
        for event_id in &delta.new_event_ids {
            inner
                .log
                .append(LogEntry::MergeApplied {
                    event_id: *event_id,
                    source: wire.node_id.clone(),
                })
                .await?;
        }
        inner.cached_root = None;
        if !delta.is_noop() {
            debug!(
                node_id = %self.node_id,
                source = %wire.node_id,
                new_events = delta.new_event_ids.len(),
                "merge applied"
            );
        }
        Ok(delta.report())
    }

    /// Takes a canonical snapshot for transport.
    pub async fn snapshot(&self) -> ReplicaWire {
        let mut inner = self.inner.lock().await;
        let root = hex::encode(inner.root());
        ReplicaWire::from_state_with_root(self.node_id.clone(), inner.version, &inner.state, root)
    }

    /// The current Merkle root, recomputing only if invalidated.
    pub async fn merkle_root(&self) -> [u8; 32] {
        self.inner.lock().await.root()
    }

    /// Hex form of [`merkle_root`](Self::merkle_root).
    pub async fn merkle_root_hex(&self) -> String {
        hex::encode(self.merkle_root().await)
    }

    /// Recomputes every log hash. O(N); audit use only.
    pub async fn verify_log(&self) -> LogAudit {
        self.inner.lock().await.log.verify()
    }

    /// The most recent `n` log records, oldest first.
    pub async fn log_tail(&self, n: usize) -> Vec<ChainRecord> {
        self.inner.lock().await.log.tail(n)
    }

    /// The local-mutation counter.
    pub async fn version(&self) -> u64 {
        self.inner.lock().await.version
    }

    /// Number of distinct live events.
    pub async fn event_count(&self) -> usize {
        self.inner.lock().await.state.event_count()
    }
}
