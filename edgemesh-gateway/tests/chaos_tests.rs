//! Chaos controller tests against the in-process fake orchestrator.

use edgemesh_gateway::{
    FakeOrchestrator, GatewayConfig, GatewayCore, GatewayError, NodeDescriptor, NodeStatus,
};
use edgemesh_types::NodeId;
use std::sync::Arc;
use std::time::Duration;

fn test_core(seed_ids: &[&str]) -> (Arc<GatewayCore>, Arc<FakeOrchestrator>) {
    let orchestrator = Arc::new(FakeOrchestrator::new());
    let core = Arc::new(GatewayCore::new(
        orchestrator.clone(),
        GatewayConfig {
            poll_interval: Duration::from_millis(100),
            fetch_timeout: Duration::from_millis(500),
            scenario_deadline: Duration::from_secs(10),
        },
    ));
    for id in seed_ids {
        core.roster.insert(NodeDescriptor::running(
            NodeId::new(*id),
            format!("http://edge-{id}:8001"),
            false,
        ));
    }
    (core, orchestrator)
}

#[tokio::test]
async fn isolate_flags_node_and_hits_port() {
    let (core, orchestrator) = test_core(&["node1", "node2"]);
    let id = NodeId::new("node1");

    let descriptor = core.chaos.isolate(&id).await.unwrap();
    assert!(descriptor.isolated);
    assert_eq!(descriptor.status, NodeStatus::Isolated);
    assert_eq!(orchestrator.calls(), vec!["isolate edge-node1"]);
}

#[tokio::test]
async fn heal_clears_isolation() {
    let (core, _) = test_core(&["node1"]);
    let id = NodeId::new("node1");

    core.chaos.isolate(&id).await.unwrap();
    let descriptor = core.chaos.heal(&id).await.unwrap();
    assert!(!descriptor.isolated);
    assert_eq!(descriptor.status, NodeStatus::Running);
}

#[tokio::test]
async fn isolate_unknown_node_is_not_found() {
    let (core, _) = test_core(&["node1"]);
    let result = core.chaos.isolate(&NodeId::new("ghost")).await;
    assert!(matches!(result, Err(GatewayError::NotFound(_))));
}

#[tokio::test]
async fn split_brain_splits_ceil_half() {
    let (core, orchestrator) = test_core(&["node1", "node2", "node3", "node4", "node5"]);

    let report = core.chaos.split_brain().await.unwrap();
    assert_eq!(report.group_a.len(), 3);
    assert_eq!(report.group_b.len(), 2);

    // Every node got directional partition rules against the other half.
    let calls = orchestrator.calls();
    assert_eq!(calls.len(), 5);
    let node1_call = calls.iter().find(|c| c.contains("partition edge-node1")).unwrap();
    assert!(node1_call.contains("edge-node4"));
    assert!(node1_call.contains("edge-node5"));
    assert!(!node1_call.contains("edge-node2"));

    for descriptor in core.roster.list() {
        assert!(descriptor.isolated);
    }
}

#[tokio::test]
async fn split_brain_needs_two_nodes() {
    let (core, _) = test_core(&["node1"]);
    assert!(matches!(
        core.chaos.split_brain().await,
        Err(GatewayError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn heal_all_heals_every_node() {
    let (core, orchestrator) = test_core(&["node1", "node2", "node3"]);
    core.chaos.split_brain().await.unwrap();

    let report = core.chaos.heal_all().await;
    assert_eq!(report.healed, 3);
    assert!(report.failures.is_empty());
    for descriptor in core.roster.list() {
        assert!(!descriptor.isolated);
    }
    assert!(orchestrator.calls().iter().any(|c| c == "heal edge-node2"));
}

#[tokio::test]
async fn create_node_registers_managed_descriptor() {
    let (core, _) = test_core(&[]);

    let descriptor = core.chaos.create_node(Some("node9".to_string())).await.unwrap();
    assert_eq!(descriptor.node_id, NodeId::new("node9"));
    assert_eq!(descriptor.name, "edge-node9");
    assert!(descriptor.managed);
    assert_eq!(core.roster.len(), 1);
}

#[tokio::test]
async fn create_node_rejects_duplicate_id() {
    let (core, _) = test_core(&["node1"]);
    let result = core.chaos.create_node(Some("node1".to_string())).await;
    assert!(matches!(result, Err(GatewayError::InvalidInput(_))));
}

#[tokio::test]
async fn delete_node_removes_from_roster() {
    let (core, orchestrator) = test_core(&["node1", "node2"]);

    core.chaos.delete_node(&NodeId::new("node1")).await.unwrap();
    assert_eq!(core.roster.len(), 1);
    assert!(core.roster.get(&NodeId::new("node1")).is_none());
    assert_eq!(orchestrator.calls(), vec!["delete edge-node1"]);
}

#[tokio::test]
async fn delete_failure_keeps_roster_entry() {
    let (core, orchestrator) = test_core(&["node1"]);
    orchestrator.fail_on("edge-node1");

    let result = core.chaos.delete_node(&NodeId::new("node1")).await;
    assert!(matches!(result, Err(GatewayError::Orchestrator(_))));
    assert_eq!(core.roster.len(), 1);
}

#[tokio::test]
async fn batch_create_is_best_effort() {
    let (core, orchestrator) = test_core(&[]);
    orchestrator.limit_creates(2);

    let report = core.chaos.create_nodes_batch(4).await;
    assert_eq!(report.requested, 4);
    assert_eq!(report.created_count, 2);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(core.roster.len(), 2);
}
