//! Gateway HTTP API.
//!
//! Routing adapter only: handlers translate requests into core
//! operations and core results into JSON. Long operations (scenarios,
//! fleet-wide partitions, batch creates) contend for the gateway-wide
//! operation mutex; losing immediately returns 409 `{"status":"busy"}`.

use crate::core::GatewayCore;
use crate::scenarios::{self, ScenarioStatus};
use crate::{GatewayError, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use edgemesh_types::NodeId;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (code, body) = match &self {
            GatewayError::InvalidInput(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "status": "failed", "message": message }),
            ),
            GatewayError::NotFound(node) => (
                StatusCode::NOT_FOUND,
                json!({ "status": "failed", "message": format!("unknown node: {node}") }),
            ),
            GatewayError::Busy => (StatusCode::CONFLICT, json!({ "status": "busy" })),
            GatewayError::Orchestrator(err) => (
                StatusCode::BAD_GATEWAY,
                json!({ "status": "failed", "message": err.to_string() }),
            ),
        };
        (code, Json(body)).into_response()
    }
}

fn try_claim_operation(core: &GatewayCore) -> Result<OwnedMutexGuard<()>> {
    core.operation_mutex
        .clone()
        .try_lock_owned()
        .map_err(|_| GatewayError::Busy)
}

// ── Node lifecycle ──────────────────────────────────────────────

async fn list_nodes(State(core): State<Arc<GatewayCore>>) -> Json<Value> {
    Json(json!({ "nodes": core.roster.list() }))
}

#[derive(Debug, Deserialize)]
struct CreateNodeQuery {
    node_id: Option<String>,
}

async fn create_node(
    State(core): State<Arc<GatewayCore>>,
    Query(query): Query<CreateNodeQuery>,
) -> Result<Json<Value>> {
    let descriptor = core.chaos.create_node(query.node_id).await?;
    Ok(Json(json!({ "status": "ok", "node": descriptor })))
}

async fn delete_node(
    State(core): State<Arc<GatewayCore>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let descriptor = core.chaos.delete_node(&NodeId::new(id)).await?;
    Ok(Json(json!({ "status": "ok", "node": descriptor })))
}

#[derive(Debug, Deserialize)]
struct BatchQuery {
    #[serde(default = "default_batch_count")]
    count: usize,
}

fn default_batch_count() -> usize {
    1
}

async fn create_nodes_batch(
    State(core): State<Arc<GatewayCore>>,
    Query(query): Query<BatchQuery>,
) -> Result<Json<Value>> {
    let _guard = try_claim_operation(&core)?;
    let report = core.chaos.create_nodes_batch(query.count).await;
    Ok(Json(serde_json::to_value(report).expect("report serializes")))
}

// ── Partitions ──────────────────────────────────────────────────

async fn partition_node(
    State(core): State<Arc<GatewayCore>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let descriptor = core.chaos.isolate(&NodeId::new(id)).await?;
    Ok(Json(json!({ "status": "ok", "node": descriptor })))
}

async fn heal_node(
    State(core): State<Arc<GatewayCore>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let descriptor = core.chaos.heal(&NodeId::new(id)).await?;
    Ok(Json(json!({ "status": "ok", "node": descriptor })))
}

async fn split_brain(State(core): State<Arc<GatewayCore>>) -> Result<Json<Value>> {
    let _guard = try_claim_operation(&core)?;
    let report = core.chaos.split_brain().await?;
    Ok(Json(json!({ "status": "ok", "groups": report })))
}

async fn heal_all(State(core): State<Arc<GatewayCore>>) -> Result<Json<Value>> {
    let _guard = try_claim_operation(&core)?;
    let report = core.chaos.heal_all().await;
    Ok(Json(serde_json::to_value(report).expect("report serializes")))
}

// ── Observation ─────────────────────────────────────────────────

async fn gateway_status(State(core): State<Arc<GatewayCore>>) -> Json<Value> {
    let latest = core.divergence.latest();
    Json(json!({
        "node_count": core.roster.len(),
        "reachable_nodes": core.metrics.counter(crate::metrics::LAST_REACHABLE_NODES),
        "polls_completed": core.metrics.counter(crate::metrics::POLLS_COMPLETED),
        "is_divergent": latest.as_ref().map(|record| record.is_divergent),
        "divergence_duration_seconds": core.divergence.divergence_duration_seconds(),
        "merged_root": core.last_merge().map(|merge| merge.merged_root),
        "uptime_seconds": core.uptime_seconds(),
    }))
}

async fn trigger_poll(State(core): State<Arc<GatewayCore>>) -> Json<Value> {
    let summary = core.run_poll_cycle().await;
    Json(serde_json::to_value(summary).expect("summary serializes"))
}

async fn merged_state(State(core): State<Arc<GatewayCore>>) -> Json<Value> {
    let merge = match core.last_merge() {
        Some(merge) => merge,
        None => {
            // First ask: run a cycle rather than answer with nothing.
            core.run_poll_cycle().await;
            core.last_merge().expect("cycle just ran")
        }
    };
    Json(serde_json::to_value(merge).expect("merge serializes"))
}

async fn divergence_log(State(core): State<Arc<GatewayCore>>) -> Json<Value> {
    Json(json!({
        "log": core.divergence.log(),
        "divergence_duration_seconds": core.divergence.divergence_duration_seconds(),
    }))
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    name: Option<String>,
    limit: Option<usize>,
}

async fn metrics_view(
    State(core): State<Arc<GatewayCore>>,
    Query(query): Query<MetricsQuery>,
) -> Json<Value> {
    match query.name {
        Some(name) => {
            let limit = query.limit.unwrap_or(100);
            Json(json!({
                "name": name,
                "samples": core.metrics.series(&name, limit),
            }))
        }
        None => Json(json!({
            "counters": core.metrics.counters(),
            "series": core.metrics.series_names(),
        })),
    }
}

async fn runtime_metrics(State(core): State<Arc<GatewayCore>>) -> Json<Value> {
    Json(json!({
        "uptime_seconds": core.uptime_seconds(),
        "node_count": core.roster.len(),
        "counters": core.metrics.counters(),
    }))
}

// ── Scenarios ───────────────────────────────────────────────────

fn scenario_response<T: serde::Serialize>(status: ScenarioStatus, result: T) -> Response {
    let body = Json(serde_json::to_value(result).expect("scenario result serializes"));
    match status {
        // Nothing executed: surface as a gateway failure.
        ScenarioStatus::Failed => (StatusCode::BAD_GATEWAY, body).into_response(),
        _ => body.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct SplitBrainHealQuery {
    #[serde(default = "default_isolate_seconds")]
    isolate_seconds: u64,
    #[serde(default = "default_verify_polls")]
    verify_polls: u32,
}

fn default_isolate_seconds() -> u64 {
    6
}

fn default_verify_polls() -> u32 {
    5
}

async fn scenario_split_brain_heal(
    State(core): State<Arc<GatewayCore>>,
    Query(query): Query<SplitBrainHealQuery>,
) -> Result<Response> {
    let _guard = try_claim_operation(&core)?;
    let result =
        scenarios::split_brain_heal(&core, query.isolate_seconds, query.verify_polls).await;
    Ok(scenario_response(result.status, result))
}

#[derive(Debug, Deserialize)]
struct BootstrapQuery {
    #[serde(default = "default_create_nodes")]
    create_nodes: usize,
    #[serde(default = "default_events_per_node")]
    events_per_node: usize,
    #[serde(default = "default_verify_polls")]
    verify_polls: u32,
}

fn default_create_nodes() -> usize {
    3
}

fn default_events_per_node() -> usize {
    5
}

async fn scenario_bootstrap_converge(
    State(core): State<Arc<GatewayCore>>,
    Query(query): Query<BootstrapQuery>,
) -> Result<Response> {
    let _guard = try_claim_operation(&core)?;
    let result = scenarios::bootstrap_converge(
        &core,
        query.create_nodes,
        query.events_per_node,
        query.verify_polls,
    )
    .await;
    Ok(scenario_response(result.status, result))
}

/// Builds the gateway router over the shared core.
pub fn build_router(core: Arc<GatewayCore>) -> Router {
    Router::new()
        .route("/nodes", get(list_nodes).post(create_node))
        .route("/nodes/batch", post(create_nodes_batch))
        .route("/nodes/{id}", delete(delete_node))
        .route("/nodes/{id}/partition", post(partition_node).delete(heal_node))
        .route("/partition/split-brain", post(split_brain))
        .route("/partition/heal-all", post(heal_all))
        .route("/gateway/status", get(gateway_status))
        .route("/gateway/poll", post(trigger_poll))
        .route("/gateway/merged-state", get(merged_state))
        .route("/gateway/divergence", get(divergence_log))
        .route("/gateway/metrics", get(metrics_view))
        .route("/gateway/runtime-metrics", get(runtime_metrics))
        .route("/scenarios/split-brain-heal", post(scenario_split_brain_heal))
        .route("/scenarios/bootstrap-converge", post(scenario_bootstrap_converge))
        .with_state(core)
}
