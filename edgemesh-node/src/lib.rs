//! Intake HTTP API for an edge node.
//!
//! Thin boundary over the replica store: `POST /event` ingests a reading,
//! the `GET` routes answer status and convergence queries, and
//! `/state/snapshot` serves the canonical snapshot the gateway and peers
//! merge from.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use edgemesh_gossip::GossipStats;
use edgemesh_replica::{EventDraft, ReplicaStore, ReplicaWire};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Longest accepted string reading.
pub const MAX_VALUE_STRING: usize = 256;
/// Longest accepted location.
pub const MAX_LOCATION: usize = 128;
/// Largest accepted metadata map, serialized.
pub const MAX_METADATA_BYTES: usize = 64 * 1024;

/// Shared state behind the intake router.
pub struct NodeState {
    /// The node's replica.
    pub store: Arc<ReplicaStore>,
    /// Gossip counters, for the status view.
    pub stats: Arc<GossipStats>,
    /// Peer gossip addresses, display form.
    pub peers: Vec<String>,
    /// The gossip broadcast period; silence past 3x this long means the
    /// node is cut off from the mesh.
    pub gossip_interval: Duration,
}

/// Body of `POST /event`.
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    /// Reading type.
    #[serde(rename = "type")]
    pub kind: String,
    /// The reading (JSON scalar).
    pub value: Value,
    /// Where the reading was taken.
    pub location: String,
    /// Free-form annotations.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Response of `POST /event`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventResponse {
    pub event_id: String,
    pub merkle_root: String,
}

/// Response of `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub peers: Vec<String>,
    pub event_count: usize,
    pub merkle_root_prefix: String,
    pub isolated: bool,
}

/// Response of `GET /state/merkle`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MerkleResponse {
    pub merkle_root: String,
}

fn validate(request: &EventRequest) -> Result<(), String> {
    if request.kind.trim().is_empty() {
        return Err("type must be non-empty".to_string());
    }
    match &request.value {
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
        Value::String(s) if s.len() <= MAX_VALUE_STRING => {}
        Value::String(_) => {
            return Err(format!("value string exceeds {MAX_VALUE_STRING} chars"));
        }
        Value::Array(_) | Value::Object(_) => {
            return Err("value must be a JSON scalar".to_string());
        }
    }
    if request.location.len() > MAX_LOCATION {
        return Err(format!("location exceeds {MAX_LOCATION} chars"));
    }
    let metadata_bytes = serde_json::to_vec(&request.metadata)
        .map_err(|err| format!("unserializable metadata: {err}"))?
        .len();
    if metadata_bytes > MAX_METADATA_BYTES {
        return Err(format!("metadata exceeds {MAX_METADATA_BYTES} bytes"));
    }
    Ok(())
}

async fn ingest_event(
    State(state): State<Arc<NodeState>>,
    Json(request): Json<EventRequest>,
) -> Result<Json<EventResponse>, (StatusCode, Json<Value>)> {
    if let Err(message) = validate(&request) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": message })),
        ));
    }

    let draft = EventDraft {
        kind: request.kind,
        value: request.value,
        location: request.location,
        metadata: request.metadata,
    };
    match state.store.ingest(draft).await {
        Ok((event, merkle_root)) => Ok(Json(EventResponse {
            event_id: event.event_id.to_string(),
            merkle_root,
        })),
        Err(err) => {
            error!(%err, "ingest failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": err.to_string() })),
            ))
        }
    }
}

async fn status(State(state): State<Arc<NodeState>>) -> Json<StatusResponse> {
    let merkle_root = state.store.merkle_root_hex().await;
    let isolated = !state.peers.is_empty() && state.stats.silent_for(state.gossip_interval * 3);
    Json(StatusResponse {
        node_id: state.store.node_id().to_string(),
        peers: state.peers.clone(),
        event_count: state.store.event_count().await,
        merkle_root_prefix: merkle_root[..8].to_string(),
        isolated,
    })
}

async fn merkle(State(state): State<Arc<NodeState>>) -> Json<MerkleResponse> {
    Json(MerkleResponse {
        merkle_root: state.store.merkle_root_hex().await,
    })
}

async fn snapshot(State(state): State<Arc<NodeState>>) -> Json<ReplicaWire> {
    Json(state.store.snapshot().await)
}

/// Builds the intake router over the given node state.
pub fn build_router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/event", post(ingest_event))
        .route("/status", get(status))
        .route("/state/merkle", get(merkle))
        .route("/state/snapshot", get(snapshot))
        .with_state(state)
}
