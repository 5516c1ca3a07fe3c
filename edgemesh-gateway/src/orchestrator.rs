//! Orchestrator port: how the gateway touches the container runtime.
//!
//! The gateway never shells out directly; everything goes through
//! [`OrchestratorPort`] so tests can swap in the in-process fake. The
//! Docker implementation drives the `docker` CLI: `run`/`rm` for node
//! lifecycle and `exec` for the iptables rules chaos operations rely on.

use crate::roster::NodeDescriptor;
use async_trait::async_trait;
use edgemesh_types::NodeId;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors surfaced by orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The runtime rejected or failed the command.
    #[error("orchestrator command failed: {0}")]
    Command(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for orchestrator operations.
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

/// Container-runtime operations the gateway needs.
///
/// `exec_isolate` severs a node from the whole mesh; `exec_partition`
/// blocks traffic to a specific set of hosts (what split-brain needs);
/// `exec_heal` flushes all rules either way.
#[async_trait]
pub trait OrchestratorPort: Send + Sync {
    /// Spawns a node container named `name` (`edge-<id>`).
    async fn create(&self, name: &str) -> OrchestratorResult<NodeDescriptor>;

    /// Stops and removes a node's container.
    async fn delete(&self, node_id: &NodeId) -> OrchestratorResult<()>;

    /// Drops all mesh UDP traffic in and out of the node.
    async fn exec_isolate(&self, node_id: &NodeId) -> OrchestratorResult<()>;

    /// Drops traffic between the node and the given hosts only.
    async fn exec_partition(&self, node_id: &NodeId, blocked_hosts: &[String])
        -> OrchestratorResult<()>;

    /// Flushes the node's INPUT/OUTPUT rules.
    async fn exec_heal(&self, node_id: &NodeId) -> OrchestratorResult<()>;
}

/// Settings for the Docker CLI implementation.
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Node image to run.
    pub image: String,
    /// Docker network the mesh lives on.
    pub network: String,
    /// Mesh subnet used when scoping isolation rules.
    pub subnet: String,
    /// Intake HTTP port inside the container.
    pub http_port: u16,
    /// Gossip UDP port inside the container.
    pub gossip_port: u16,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            image: "edgemesh-node:latest".to_string(),
            network: "edgemesh".to_string(),
            subnet: "172.28.0.0/16".to_string(),
            http_port: 8001,
            gossip_port: 9000,
        }
    }
}

/// Drives node containers through the `docker` CLI.
pub struct DockerOrchestrator {
    config: DockerConfig,
    /// Hostnames of containers created so far, for peer wiring.
    mesh_hosts: std::sync::Mutex<Vec<String>>,
}

impl DockerOrchestrator {
    /// Creates an orchestrator; `seed_hosts` are containers that already
    /// exist (from compose or a previous run).
    #[must_use]
    pub fn new(config: DockerConfig, seed_hosts: Vec<String>) -> Self {
        Self {
            config,
            mesh_hosts: std::sync::Mutex::new(seed_hosts),
        }
    }

    async fn run(&self, args: &[&str]) -> OrchestratorResult<String> {
        debug!(command = ?args, "docker");
        let output = Command::new("docker")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(OrchestratorError::Command(format!(
                "docker {}: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn exec_iptables(&self, name: &str, rule: &[&str]) -> OrchestratorResult<()> {
        let mut args = vec!["exec", name, "iptables"];
        args.extend_from_slice(rule);
        self.run(&args).await?;
        Ok(())
    }

    fn container_name(node_id: &NodeId) -> String {
        format!("edge-{node_id}")
    }
}

#[async_trait]
impl OrchestratorPort for DockerOrchestrator {
    async fn create(&self, name: &str) -> OrchestratorResult<NodeDescriptor> {
        let node_id = name.strip_prefix("edge-").unwrap_or(name).to_string();
        let gossip = self.config.gossip_port.to_string();
        let http = self.config.http_port.to_string();

        let peers: Vec<String> = {
            let hosts = self.mesh_hosts.lock().expect("mesh hosts lock");
            hosts
                .iter()
                .map(|host| format!("{host}:{}", self.config.gossip_port))
                .collect()
        };

        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            name.to_string(),
            "--hostname".into(),
            name.to_string(),
            "--network".into(),
            self.config.network.clone(),
            "--cap-add".into(),
            "NET_ADMIN".into(),
            self.config.image.clone(),
            "--node-id".into(),
            node_id.clone(),
            "--http-port".into(),
            http,
            "--gossip-port".into(),
            gossip,
        ];
        for peer in &peers {
            args.push("--peer".into());
            args.push(peer.clone());
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs).await?;
        info!(%name, peers = peers.len(), "node container started");

        self.mesh_hosts
            .lock()
            .expect("mesh hosts lock")
            .push(name.to_string());

        Ok(NodeDescriptor {
            node_id: NodeId::new(node_id.clone()),
            name: name.to_string(),
            url: format!("http://{name}:{}", self.config.http_port),
            status: crate::roster::NodeStatus::Running,
            managed: true,
            isolated: false,
        })
    }

    async fn delete(&self, node_id: &NodeId) -> OrchestratorResult<()> {
        let name = Self::container_name(node_id);
        self.run(&["rm", "-f", &name]).await?;
        self.mesh_hosts
            .lock()
            .expect("mesh hosts lock")
            .retain(|host| host != &name);
        info!(%name, "node container removed");
        Ok(())
    }

    async fn exec_isolate(&self, node_id: &NodeId) -> OrchestratorResult<()> {
        let name = Self::container_name(node_id);
        let port = self.config.gossip_port.to_string();
        let subnet = self.config.subnet.as_str();
        self.exec_iptables(
            &name,
            &["-A", "INPUT", "-s", subnet, "-p", "udp", "--dport", &port, "-j", "DROP"],
        )
        .await?;
        self.exec_iptables(
            &name,
            &["-A", "OUTPUT", "-d", subnet, "-p", "udp", "--dport", &port, "-j", "DROP"],
        )
        .await?;
        Ok(())
    }

    async fn exec_partition(
        &self,
        node_id: &NodeId,
        blocked_hosts: &[String],
    ) -> OrchestratorResult<()> {
        let name = Self::container_name(node_id);
        for host in blocked_hosts {
            self.exec_iptables(&name, &["-A", "INPUT", "-s", host, "-j", "DROP"])
                .await?;
            self.exec_iptables(&name, &["-A", "OUTPUT", "-d", host, "-j", "DROP"])
                .await?;
        }
        Ok(())
    }

    async fn exec_heal(&self, node_id: &NodeId) -> OrchestratorResult<()> {
        let name = Self::container_name(node_id);
        self.exec_iptables(&name, &["-F", "INPUT"]).await?;
        self.exec_iptables(&name, &["-F", "OUTPUT"]).await?;
        Ok(())
    }
}

/// An in-process orchestrator for tests.
pub mod fake {
    use super::*;
    use crate::roster::NodeStatus;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// Records every call; optionally fails specific node names or all
    /// creates past a budget.
    #[derive(Default)]
    pub struct FakeOrchestrator {
        calls: Mutex<Vec<String>>,
        fail_names: Mutex<BTreeSet<String>>,
        create_budget: Mutex<Option<usize>>,
    }

    impl FakeOrchestrator {
        /// Creates a fake that succeeds on everything.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every operation touching `name` fail.
        pub fn fail_on(&self, name: impl Into<String>) {
            self.fail_names
                .lock()
                .expect("fake lock")
                .insert(name.into());
        }

        /// Allows only `budget` further creates; the rest fail.
        pub fn limit_creates(&self, budget: usize) {
            *self.create_budget.lock().expect("fake lock") = Some(budget);
        }

        /// Every call made so far, e.g. `"isolate edge-node1"`.
        #[must_use]
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("fake lock").clone()
        }

        fn record(&self, call: String, subject: &str) -> OrchestratorResult<()> {
            self.calls.lock().expect("fake lock").push(call);
            if self.fail_names.lock().expect("fake lock").contains(subject) {
                return Err(OrchestratorError::Command(format!(
                    "injected failure for {subject}"
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl OrchestratorPort for FakeOrchestrator {
        async fn create(&self, name: &str) -> OrchestratorResult<NodeDescriptor> {
            self.record(format!("create {name}"), name)?;
            {
                let mut budget = self.create_budget.lock().expect("fake lock");
                if let Some(remaining) = budget.as_mut() {
                    if *remaining == 0 {
                        return Err(OrchestratorError::Command(
                            "create budget exhausted".to_string(),
                        ));
                    }
                    *remaining -= 1;
                }
            }
            let node_id = name.strip_prefix("edge-").unwrap_or(name).to_string();
            Ok(NodeDescriptor {
                node_id: NodeId::new(node_id),
                name: name.to_string(),
                url: format!("http://{name}:8001"),
                status: NodeStatus::Running,
                managed: true,
                isolated: false,
            })
        }

        async fn delete(&self, node_id: &NodeId) -> OrchestratorResult<()> {
            let name = format!("edge-{node_id}");
            self.record(format!("delete {name}"), &name)
        }

        async fn exec_isolate(&self, node_id: &NodeId) -> OrchestratorResult<()> {
            let name = format!("edge-{node_id}");
            self.record(format!("isolate {name}"), &name)
        }

        async fn exec_partition(
            &self,
            node_id: &NodeId,
            blocked_hosts: &[String],
        ) -> OrchestratorResult<()> {
            let name = format!("edge-{node_id}");
            self.record(
                format!("partition {name} from [{}]", blocked_hosts.join(", ")),
                &name,
            )
        }

        async fn exec_heal(&self, node_id: &NodeId) -> OrchestratorResult<()> {
            let name = format!("edge-{node_id}");
            self.record(format!("heal {name}"), &name)
        }
    }
}
