//! Gateway HTTP API tests against real in-process node servers.

use edgemesh_gateway::{
    build_router, FakeOrchestrator, GatewayConfig, GatewayCore, NodeDescriptor,
};
use edgemesh_gossip::GossipStats;
use edgemesh_node::NodeState;
use edgemesh_replica::ReplicaStore;
use edgemesh_types::NodeId;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Spins up a real intake server for one node, returning its URL and store.
async fn spawn_node(id: &str) -> (String, Arc<ReplicaStore>) {
    let store = Arc::new(ReplicaStore::in_memory(NodeId::new(id)));
    let state = Arc::new(NodeState {
        store: store.clone(),
        stats: Arc::new(GossipStats::default()),
        peers: Vec::new(),
        gossip_interval: Duration::from_secs(5),
    });
    let app = edgemesh_node::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://127.0.0.1:{}", port), store)
}

async fn spawn_gateway(nodes: &[(&str, &str)]) -> (String, Arc<GatewayCore>) {
    let orchestrator = Arc::new(FakeOrchestrator::new());
    let core = Arc::new(GatewayCore::new(
        orchestrator,
        GatewayConfig {
            poll_interval: Duration::from_millis(100),
            fetch_timeout: Duration::from_millis(800),
            scenario_deadline: Duration::from_secs(10),
        },
    ));
    for (id, url) in nodes {
        core.roster
            .insert(NodeDescriptor::running(NodeId::new(*id), *url, false));
    }

    let app = build_router(core.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://127.0.0.1:{}", port), core)
}

fn event_body(kind: &str, value: Value, location: &str) -> Value {
    json!({ "type": kind, "value": value, "location": location })
}

#[tokio::test]
async fn poll_detects_divergence_and_convergence() {
    let (url1, store1) = spawn_node("node1").await;
    let (url2, store2) = spawn_node("node2").await;
    let (base, _) = spawn_gateway(&[("node1", &url1), ("node2", &url2)]).await;
    let client = reqwest::Client::new();

    // Different events on each node: divergent.
    client
        .post(format!("{}/event", url1))
        .json(&event_body("water_level", json!(3.2), "bridge_north"))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{}/event", url2))
        .json(&event_body("injured_count", json!(14), "shelter_east"))
        .send()
        .await
        .unwrap();

    let poll: Value = client
        .post(format!("{}/gateway/poll", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(poll["reachable_nodes"], 2);
    assert_eq!(poll["is_divergent"], true);

    // Cross-merge the replicas (what gossip would do), then poll again.
    let snap1 = store1.snapshot().await;
    let snap2 = store2.snapshot().await;
    store1.merge(&snap2).await.unwrap();
    store2.merge(&snap1).await.unwrap();

    let poll: Value = client
        .post(format!("{}/gateway/poll", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(poll["is_divergent"], false);

    // The divergent → synced transition counts as a convergence event.
    let status: Value = client
        .get(format!("{}/gateway/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["node_count"], 2);
    assert_eq!(status["is_divergent"], false);
    assert_eq!(status["divergence_duration_seconds"], 0);

    let metrics: Value = client
        .get(format!("{}/gateway/metrics", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metrics["counters"]["total_convergence_events"], 1);
    assert_eq!(metrics["counters"]["polls_completed"], 2);
}

#[tokio::test]
async fn divergence_log_is_newest_first() {
    let (url1, _store1) = spawn_node("node1").await;
    let (base, _) = spawn_gateway(&[("node1", &url1)]).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        client
            .post(format!("{}/gateway/poll", base))
            .send()
            .await
            .unwrap();
    }

    let divergence: Value = client
        .get(format!("{}/gateway/divergence", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let log = divergence["log"].as_array().unwrap();
    assert_eq!(log.len(), 3);
    let newest = log[0]["timestamp_ms"].as_u64().unwrap();
    let oldest = log[2]["timestamp_ms"].as_u64().unwrap();
    assert!(newest >= oldest);
}

#[tokio::test]
async fn merged_state_contains_all_events() {
    let (url1, _s1) = spawn_node("node1").await;
    let (url2, _s2) = spawn_node("node2").await;
    let (base, _) = spawn_gateway(&[("node1", &url1), ("node2", &url2)]).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/event", url1))
        .json(&event_body("water_level", json!(3.2), "bridge_north"))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{}/event", url2))
        .json(&event_body("road_status", json!("blocked"), "highway_101"))
        .send()
        .await
        .unwrap();

    // No explicit poll first: the endpoint runs one on demand.
    let merged: Value = client
        .get(format!("{}/gateway/merged-state", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let adds = merged["merged_state"]["events"]["adds"].as_array().unwrap();
    assert_eq!(adds.len(), 2);
    assert_eq!(merged["per_node_roots"].as_object().unwrap().len(), 2);
    assert_eq!(merged["merged_root"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn metrics_series_respects_limit() {
    let (url1, _s1) = spawn_node("node1").await;
    let (base, _) = spawn_gateway(&[("node1", &url1)]).await;
    let client = reqwest::Client::new();

    for _ in 0..5 {
        client
            .post(format!("{}/gateway/poll", base))
            .send()
            .await
            .unwrap();
    }

    let series: Value = client
        .get(format!("{}/gateway/metrics?name=merge_time_ms&limit=2", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(series["name"], "merge_time_ms");
    assert_eq!(series["samples"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn node_lifecycle_endpoints() {
    let (base, core) = spawn_gateway(&[]).await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("{}/nodes?node_id=node7", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["node"]["name"], "edge-node7");
    assert_eq!(core.roster.len(), 1);

    let listed: Value = client
        .get(format!("{}/nodes", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["nodes"].as_array().unwrap().len(), 1);

    let deleted = client
        .delete(format!("{}/nodes/node7", base))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 200);
    assert_eq!(core.roster.len(), 0);

    let missing = client
        .delete(format!("{}/nodes/node7", base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn partition_endpoints_flag_roster() {
    let (url1, _s1) = spawn_node("node1").await;
    let (base, core) = spawn_gateway(&[("node1", &url1)]).await;
    let client = reqwest::Client::new();

    let isolated = client
        .post(format!("{}/nodes/node1/partition", base))
        .send()
        .await
        .unwrap();
    assert_eq!(isolated.status(), 200);
    assert!(core.roster.get(&NodeId::new("node1")).unwrap().isolated);

    let healed = client
        .delete(format!("{}/nodes/node1/partition", base))
        .send()
        .await
        .unwrap();
    assert_eq!(healed.status(), 200);
    assert!(!core.roster.get(&NodeId::new("node1")).unwrap().isolated);
}

#[tokio::test]
async fn split_brain_heal_scenario_converges() {
    // Two empty replicas fingerprint-match, so after heal the first
    // verify poll already observes convergence.
    let (url1, _s1) = spawn_node("node1").await;
    let (url2, _s2) = spawn_node("node2").await;
    let (base, _) = spawn_gateway(&[("node1", &url1), ("node2", &url2)]).await;
    let client = reqwest::Client::new();

    let result: Value = client
        .post(format!(
            "{}/scenarios/split-brain-heal?isolate_seconds=0&verify_polls=2",
            base
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(result["action"], "split-brain-heal");
    assert_eq!(result["status"], "ok");
    assert_eq!(result["converged"], true);
    assert_eq!(result["groups"]["group_a"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn zero_verify_polls_reports_partial() {
    let (url1, _s1) = spawn_node("node1").await;
    let (url2, _s2) = spawn_node("node2").await;
    let (base, _) = spawn_gateway(&[("node1", &url1), ("node2", &url2)]).await;
    let client = reqwest::Client::new();

    let result: Value = client
        .post(format!(
            "{}/scenarios/split-brain-heal?isolate_seconds=0&verify_polls=0",
            base
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(result["status"], "partial");
    assert_eq!(result["converged"], false);
}

#[tokio::test]
async fn concurrent_scenarios_one_gets_busy() {
    let (url1, _s1) = spawn_node("node1").await;
    let (url2, _s2) = spawn_node("node2").await;
    let (base, _) = spawn_gateway(&[("node1", &url1), ("node2", &url2)]).await;
    let client = reqwest::Client::new();

    let url = format!(
        "{}/scenarios/split-brain-heal?isolate_seconds=1&verify_polls=0",
        base
    );
    let (first, second) = tokio::join!(
        client.post(&url).send(),
        client.post(&url).send(),
    );

    let mut statuses = vec![first.unwrap().status(), second.unwrap().status()];
    statuses.sort();
    assert_eq!(statuses, vec![200, 409]);
}

#[tokio::test]
async fn busy_body_says_busy() {
    let (url1, _s1) = spawn_node("node1").await;
    let (url2, _s2) = spawn_node("node2").await;
    let (base, core) = spawn_gateway(&[("node1", &url1), ("node2", &url2)]).await;
    let client = reqwest::Client::new();

    // Hold the operation mutex as a long-running operation would.
    let _guard = core.operation_mutex.clone().try_lock_owned().unwrap();

    let response = client
        .post(format!("{}/partition/split-brain", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "busy");
}

#[tokio::test]
async fn bootstrap_converge_with_unreachable_creations_reports_failures() {
    // The fake orchestrator "creates" nodes whose URLs resolve nowhere,
    // so event injection fails and verification can't see them.
    let (base, _) = spawn_gateway(&[]).await;
    let client = reqwest::Client::new();

    let result: Value = client
        .post(format!(
            "{}/scenarios/bootstrap-converge?create_nodes=2&events_per_node=1&verify_polls=0",
            base
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(result["action"], "bootstrap-converge");
    assert_eq!(result["status"], "partial");
    assert_eq!(result["created_count"], 2);
    assert_eq!(result["successful_events"], 0);
    assert_eq!(result["failed_events"], 2);
}
