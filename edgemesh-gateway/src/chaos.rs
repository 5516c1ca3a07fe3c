//! Chaos operations: partitions, healing, node lifecycle.
//!
//! Everything here goes through the orchestrator port, so the same
//! controller runs against Docker in production and the in-process fake
//! in tests. The roster is updated only after the runtime call succeeds.

use crate::orchestrator::OrchestratorPort;
use crate::roster::{NodeDescriptor, Roster};
use crate::{GatewayError, Result};
use edgemesh_types::NodeId;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a split-brain partition.
#[derive(Debug, Clone, Serialize)]
pub struct SplitBrainReport {
    /// First ⌈N/2⌉ nodes.
    pub group_a: Vec<NodeId>,
    /// The rest.
    pub group_b: Vec<NodeId>,
}

/// Result of a best-effort batch create.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub requested: usize,
    pub created_count: usize,
    pub failures: Vec<String>,
}

/// Result of healing the whole fleet.
#[derive(Debug, Clone, Serialize)]
pub struct HealAllReport {
    pub healed: usize,
    pub failures: Vec<String>,
}

/// Imperative chaos operations over the fleet.
pub struct ChaosController {
    orchestrator: Arc<dyn OrchestratorPort>,
    roster: Arc<Roster>,
}

impl ChaosController {
    /// Creates a controller over the given port and roster.
    pub fn new(orchestrator: Arc<dyn OrchestratorPort>, roster: Arc<Roster>) -> Self {
        Self {
            orchestrator,
            roster,
        }
    }

    fn known(&self, node_id: &NodeId) -> Result<NodeDescriptor> {
        self.roster
            .get(node_id)
            .ok_or_else(|| GatewayError::NotFound(node_id.to_string()))
    }

    /// Severs a node from the mesh (UDP drop both directions).
    pub async fn isolate(&self, node_id: &NodeId) -> Result<NodeDescriptor> {
        self.known(node_id)?;
        self.orchestrator.exec_isolate(node_id).await?;
        self.roster.set_isolated(node_id, true);
        info!(%node_id, "node isolated");
        self.known(node_id)
    }

    /// Flushes a node's partition rules.
    pub async fn heal(&self, node_id: &NodeId) -> Result<NodeDescriptor> {
        self.known(node_id)?;
        self.orchestrator.exec_heal(node_id).await?;
        self.roster.set_isolated(node_id, false);
        info!(%node_id, "node healed");
        self.known(node_id)
    }

    /// Heals every node in parallel, best-effort.
    pub async fn heal_all(&self) -> HealAllReport {
        let nodes = self.roster.list();
        let heals = nodes.iter().map(|descriptor| {
            let node_id = descriptor.node_id.clone();
            async move {
                let result = self.orchestrator.exec_heal(&node_id).await;
                (node_id, result)
            }
        });

        let mut healed = 0;
        let mut failures = Vec::new();
        for (node_id, result) in join_all(heals).await {
            match result {
                Ok(()) => {
                    self.roster.set_isolated(&node_id, false);
                    healed += 1;
                }
                Err(err) => {
                    warn!(%node_id, %err, "heal failed");
                    failures.push(format!("{node_id}: {err}"));
                }
            }
        }
        info!(healed, failures = failures.len(), "heal-all finished");
        HealAllReport { healed, failures }
    }

    /// Partitions the roster into two halves that cannot hear each other.
    ///
    /// The first ⌈N/2⌉ nodes (in id order) form group A; directional drop
    /// rules are installed on every node against the opposite group, so
    /// intra-group gossip keeps flowing.
    pub async fn split_brain(&self) -> Result<SplitBrainReport> {
        let nodes = self.roster.list();
        if nodes.len() < 2 {
            return Err(GatewayError::InvalidInput(
                "split-brain needs at least 2 nodes".to_string(),
            ));
        }

        let half = nodes.len().div_ceil(2);
        let (group_a, group_b) = nodes.split_at(half);
        let hosts_a: Vec<String> = group_a.iter().map(NodeDescriptor::host).collect();
        let hosts_b: Vec<String> = group_b.iter().map(NodeDescriptor::host).collect();

        let partitions = nodes.iter().enumerate().map(|(index, descriptor)| {
            let blocked = if index < half { &hosts_b } else { &hosts_a };
            let node_id = descriptor.node_id.clone();
            async move {
                let result = self.orchestrator.exec_partition(&node_id, blocked).await;
                (node_id, result)
            }
        });

        for (node_id, result) in join_all(partitions).await {
            result?;
            self.roster.set_isolated(&node_id, true);
        }

        let report = SplitBrainReport {
            group_a: group_a.iter().map(|d| d.node_id.clone()).collect(),
            group_b: group_b.iter().map(|d| d.node_id.clone()).collect(),
        };
        info!(
            group_a = report.group_a.len(),
            group_b = report.group_b.len(),
            "split-brain applied"
        );
        Ok(report)
    }

    /// Spawns a new managed node and registers it.
    pub async fn create_node(&self, requested_id: Option<String>) -> Result<NodeDescriptor> {
        let node_id = match requested_id {
            Some(id) if !id.trim().is_empty() => id,
            Some(_) => return Err(GatewayError::InvalidInput("empty node_id".to_string())),
            None => format!("node-{}", &Uuid::new_v4().simple().to_string()[..6]),
        };
        if self.roster.get(&NodeId::new(node_id.clone())).is_some() {
            return Err(GatewayError::InvalidInput(format!(
                "node {node_id} already exists"
            )));
        }

        let name = format!("edge-{node_id}");
        let descriptor = self.orchestrator.create(&name).await?;
        self.roster.insert(descriptor.clone());
        info!(node_id = %descriptor.node_id, "node created");
        Ok(descriptor)
    }

    /// Stops, removes, and deregisters a managed node.
    pub async fn delete_node(&self, node_id: &NodeId) -> Result<NodeDescriptor> {
        let descriptor = self.known(node_id)?;
        self.orchestrator.delete(node_id).await?;
        self.roster.remove(node_id);
        info!(%node_id, "node deleted");
        Ok(descriptor)
    }

    /// Creates up to `count` nodes, collecting failures instead of
    /// stopping at the first one.
    pub async fn create_nodes_batch(&self, count: usize) -> BatchReport {
        let mut created_count = 0;
        let mut failures = Vec::new();
        for _ in 0..count {
            match self.create_node(None).await {
                Ok(_) => created_count += 1,
                Err(err) => failures.push(err.to_string()),
            }
        }
        BatchReport {
            requested: count,
            created_count,
            failures,
        }
    }
}
