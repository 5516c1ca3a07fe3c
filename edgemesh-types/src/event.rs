//! Telemetry events — the unit of replication.
//!
//! An event is an immutable record produced at intake: a sensor reading,
//! an incident report, a status update. The ingesting node assigns the id
//! and timestamp; after that the record never changes, so replicas can
//! exchange events freely without conflict resolution at the event level.

use crate::{now_ms, EventId, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// An immutable telemetry record.
///
/// `metadata` is a sorted map so the serialized form is canonical — the
/// Merkle digest hashes events exactly as they serialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Unique id, assigned by the ingesting node.
    pub event_id: EventId,

    /// The node that ingested this event.
    pub node_origin: NodeId,

    /// Reading type, e.g. `water_level` or `road_status`.
    #[serde(rename = "type")]
    pub kind: String,

    /// The reading itself — a JSON scalar.
    pub value: Value,

    /// Where the reading was taken, e.g. `bridge_north`.
    pub location: String,

    /// Free-form annotations.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,

    /// Ingestion wall-clock time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl TelemetryEvent {
    /// Creates a new event, assigning the id and timestamp.
    #[must_use]
    pub fn new(
        node_origin: NodeId,
        kind: impl Into<String>,
        value: Value,
        location: impl Into<String>,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            node_origin,
            kind: kind.into(),
            value,
            location: location.into(),
            metadata,
            timestamp_ms: now_ms(),
        }
    }
}
