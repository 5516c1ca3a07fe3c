//! The gateway's view of the fleet.
//!
//! One descriptor per known node, plus the consecutive-failure count the
//! poller uses to demote nodes to `unreachable`. Nodes are never dropped
//! for being unreachable — only an explicit delete removes them.

use edgemesh_types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Consecutive failed polls before a node is marked unreachable.
pub const UNREACHABLE_AFTER_FAILURES: u32 = 3;

/// Lifecycle state of a node, as the gateway sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Running,
    Isolated,
    Stopped,
    Unreachable,
}

/// One fleet member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// The node's id.
    pub node_id: NodeId,
    /// Container/display name, `edge-<id>`.
    pub name: String,
    /// Base URL of the node's intake API.
    pub url: String,
    /// Current lifecycle state.
    pub status: NodeStatus,
    /// True when this node was created through the orchestrator.
    pub managed: bool,
    /// True while partition rules are applied to this node.
    pub isolated: bool,
}

impl NodeDescriptor {
    /// Builds a descriptor for a running, reachable node.
    #[must_use]
    pub fn running(node_id: NodeId, url: impl Into<String>, managed: bool) -> Self {
        let name = format!("edge-{node_id}");
        Self {
            node_id,
            name,
            url: url.into(),
            status: NodeStatus::Running,
            managed,
            isolated: false,
        }
    }

    /// Host portion of the node's URL (for partition rules).
    #[must_use]
    pub fn host(&self) -> String {
        let stripped = self
            .url
            .strip_prefix("http://")
            .or_else(|| self.url.strip_prefix("https://"))
            .unwrap_or(&self.url);
        let end = stripped
            .find([':', '/'])
            .unwrap_or(stripped.len());
        stripped[..end].to_string()
    }
}

struct Tracked {
    descriptor: NodeDescriptor,
    consecutive_failures: u32,
}

/// Thread-safe fleet membership map.
#[derive(Default)]
pub struct Roster {
    inner: Mutex<BTreeMap<NodeId, Tracked>>,
}

impl Roster {
    /// Creates an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a node.
    pub fn insert(&self, descriptor: NodeDescriptor) {
        let mut inner = self.inner.lock().expect("roster lock");
        inner.insert(
            descriptor.node_id.clone(),
            Tracked {
                descriptor,
                consecutive_failures: 0,
            },
        );
    }

    /// Removes a node, returning its descriptor.
    pub fn remove(&self, node_id: &NodeId) -> Option<NodeDescriptor> {
        let mut inner = self.inner.lock().expect("roster lock");
        inner.remove(node_id).map(|tracked| tracked.descriptor)
    }

    /// Looks up one node.
    #[must_use]
    pub fn get(&self, node_id: &NodeId) -> Option<NodeDescriptor> {
        let inner = self.inner.lock().expect("roster lock");
        inner.get(node_id).map(|tracked| tracked.descriptor.clone())
    }

    /// All descriptors, in node-id order.
    #[must_use]
    pub fn list(&self) -> Vec<NodeDescriptor> {
        let inner = self.inner.lock().expect("roster lock");
        inner
            .values()
            .map(|tracked| tracked.descriptor.clone())
            .collect()
    }

    /// Number of known nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("roster lock").len()
    }

    /// True when no node is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records a successful poll: resets the failure count and restores
    /// `running` unless partition rules are still in place.
    pub fn record_success(&self, node_id: &NodeId) {
        let mut inner = self.inner.lock().expect("roster lock");
        if let Some(tracked) = inner.get_mut(node_id) {
            tracked.consecutive_failures = 0;
            if tracked.descriptor.status == NodeStatus::Unreachable {
                tracked.descriptor.status = if tracked.descriptor.isolated {
                    NodeStatus::Isolated
                } else {
                    NodeStatus::Running
                };
            }
        }
    }

    /// Records a failed poll; after enough in a row the node is marked
    /// unreachable (but kept in the roster). Returns the new count.
    pub fn record_failure(&self, node_id: &NodeId) -> u32 {
        let mut inner = self.inner.lock().expect("roster lock");
        match inner.get_mut(node_id) {
            Some(tracked) => {
                tracked.consecutive_failures += 1;
                if tracked.consecutive_failures >= UNREACHABLE_AFTER_FAILURES {
                    tracked.descriptor.status = NodeStatus::Unreachable;
                }
                tracked.consecutive_failures
            }
            None => 0,
        }
    }

    /// Flags partition rules on or off for a node.
    pub fn set_isolated(&self, node_id: &NodeId, isolated: bool) {
        let mut inner = self.inner.lock().expect("roster lock");
        if let Some(tracked) = inner.get_mut(node_id) {
            tracked.descriptor.isolated = isolated;
            if tracked.descriptor.status != NodeStatus::Unreachable {
                tracked.descriptor.status = if isolated {
                    NodeStatus::Isolated
                } else {
                    NodeStatus::Running
                };
            }
        }
    }
}
