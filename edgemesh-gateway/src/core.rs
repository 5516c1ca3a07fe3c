//! Gateway wiring: shared components and the poll cycle.
//!
//! One `GatewayCore` per process, created at startup and passed (in an
//! `Arc`) to the HTTP layer, the background poll loop, and scenarios.
//! There are no ambient globals.

use crate::chaos::ChaosController;
use crate::divergence::DivergenceTracker;
use crate::merger::{merge_snapshots, MergeOutcome};
use crate::metrics::{self, MetricsRegistry};
use crate::orchestrator::OrchestratorPort;
use crate::poller::FleetPoller;
use crate::roster::Roster;
use edgemesh_types::NodeId;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Gateway timing knobs.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Period of the background poll loop.
    pub poll_interval: Duration,
    /// Per-fetch deadline.
    pub fetch_timeout: Duration,
    /// Total deadline for a scenario run.
    pub scenario_deadline: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            fetch_timeout: Duration::from_millis(1500),
            scenario_deadline: Duration::from_secs(60),
        }
    }
}

/// What one poll cycle observed.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub reachable_nodes: usize,
    pub unreachable_nodes: usize,
    pub merged_root: String,
    pub is_divergent: bool,
}

/// Process-wide gateway state.
pub struct GatewayCore {
    pub config: GatewayConfig,
    pub roster: Arc<Roster>,
    pub metrics: Arc<MetricsRegistry>,
    pub divergence: Arc<DivergenceTracker>,
    pub poller: FleetPoller,
    pub chaos: ChaosController,
    /// Serializes scenarios and long chaos operations fleet-wide.
    pub operation_mutex: Arc<tokio::sync::Mutex<()>>,
    last_merge: std::sync::Mutex<Option<MergeOutcome>>,
    started_at: Instant,
}

impl GatewayCore {
    /// Wires up all gateway components around one orchestrator port.
    pub fn new(orchestrator: Arc<dyn OrchestratorPort>, config: GatewayConfig) -> Self {
        let roster = Arc::new(Roster::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let divergence = Arc::new(DivergenceTracker::new());
        let poller = FleetPoller::new(roster.clone(), metrics.clone(), config.fetch_timeout);
        let chaos = ChaosController::new(orchestrator, roster.clone());
        Self {
            config,
            roster,
            metrics,
            divergence,
            poller,
            chaos,
            operation_mutex: Arc::new(tokio::sync::Mutex::new(())),
            last_merge: std::sync::Mutex::new(None),
            started_at: Instant::now(),
        }
    }

    /// One full cycle: fetch all snapshots, consolidate, record
    /// divergence, publish metrics.
    pub async fn run_poll_cycle(&self) -> CycleSummary {
        let outcome = self.poller.poll_once().await;
        let reachable: Vec<NodeId> = outcome
            .snapshots
            .iter()
            .map(|wire| wire.node_id.clone())
            .collect();

        let merge_started = Instant::now();
        let merged = merge_snapshots(&outcome.snapshots);
        let merge_ms = merge_started.elapsed().as_secs_f64() * 1000.0;

        let (record, converged_now) = self
            .divergence
            .record(merged.per_node_roots.clone(), reachable.clone());

        self.metrics.incr(metrics::POLLS_COMPLETED, 1);
        self.metrics
            .set(metrics::LAST_REACHABLE_NODES, reachable.len() as u64);
        self.metrics
            .set(metrics::LAST_MERGE_DURATION_MS, merge_ms as u64);
        self.metrics.record(metrics::MERGE_TIME_MS, merge_ms);
        if converged_now {
            self.metrics.incr(metrics::TOTAL_CONVERGENCE_EVENTS, 1);
        }

        let summary = CycleSummary {
            reachable_nodes: reachable.len(),
            unreachable_nodes: outcome.unreachable.len(),
            merged_root: merged.merged_root.clone(),
            is_divergent: record.is_divergent,
        };
        *self.last_merge.lock().expect("last merge lock") = Some(merged);

        debug!(
            reachable = summary.reachable_nodes,
            unreachable = summary.unreachable_nodes,
            divergent = summary.is_divergent,
            "poll cycle done"
        );
        summary
    }

    /// The most recent consolidation, if any poll has completed.
    #[must_use]
    pub fn last_merge(&self) -> Option<MergeOutcome> {
        self.last_merge.lock().expect("last merge lock").clone()
    }

    /// Seconds since the gateway started.
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
