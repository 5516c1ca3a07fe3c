//! Scripted chaos scenarios.
//!
//! Scenarios are straight-line async state machines; every stage is
//! logged by name so test harnesses can follow the run. A scenario holds
//! the gateway-wide operation mutex (acquired by the HTTP layer) and runs
//! under a total deadline — on expiry it reports `partial` with whatever
//! it got done.

use crate::chaos::SplitBrainReport;
use crate::core::GatewayCore;
use serde::Serialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

/// How a scenario ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    /// Everything ran and the goal was observed.
    Ok,
    /// Something ran, but the goal was not observed (or the deadline
    /// expired).
    Partial,
    /// Nothing was executed.
    Failed,
}

/// Result of `split-brain-heal`.
#[derive(Debug, Clone, Serialize)]
pub struct SplitBrainHealResult {
    pub action: &'static str,
    pub status: ScenarioStatus,
    pub converged: bool,
    pub isolate_seconds: u64,
    pub verify_polls: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<SplitBrainReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub elapsed_ms: u64,
}

/// Result of `bootstrap-converge`.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapConvergeResult {
    pub action: &'static str,
    pub status: ScenarioStatus,
    pub converged: bool,
    pub created_count: usize,
    pub successful_events: usize,
    pub failed_events: usize,
    pub failures: Vec<String>,
    pub elapsed_ms: u64,
}

/// `START → PARTITIONING → PARTITIONED → HEALING → VERIFYING → DONE`.
///
/// Creates a split-brain, holds it for `isolate_seconds`, heals the whole
/// fleet, then polls up to `verify_polls` times waiting for the fleet to
/// fingerprint-match again.
pub async fn split_brain_heal(
    core: &GatewayCore,
    isolate_seconds: u64,
    verify_polls: u32,
) -> SplitBrainHealResult {
    let action = "split-brain-heal";
    let started = Instant::now();
    let deadline = started + core.config.scenario_deadline;

    info!(stage = "START", action, isolate_seconds, verify_polls);

    info!(stage = "PARTITIONING", action);
    let groups = match core.chaos.split_brain().await {
        Ok(groups) => groups,
        Err(err) => {
            warn!(stage = "DONE", action, %err, "partitioning failed");
            return SplitBrainHealResult {
                action,
                status: ScenarioStatus::Failed,
                converged: false,
                isolate_seconds,
                verify_polls,
                groups: None,
                message: Some(err.to_string()),
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
        }
    };

    info!(stage = "PARTITIONED", action, seconds = isolate_seconds);
    let hold = Duration::from_secs(isolate_seconds)
        .min(deadline.saturating_duration_since(Instant::now()));
    sleep(hold).await;

    info!(stage = "HEALING", action);
    let heal = core.chaos.heal_all().await;
    let message = if heal.failures.is_empty() {
        None
    } else {
        Some(format!("heal failures: {}", heal.failures.join("; ")))
    };

    info!(stage = "VERIFYING", action, polls = verify_polls);
    let mut converged = false;
    for _ in 0..verify_polls {
        if Instant::now() >= deadline {
            warn!(action, "scenario deadline expired during verification");
            break;
        }
        let summary = core.run_poll_cycle().await;
        if summary.reachable_nodes > 0 && !summary.is_divergent {
            converged = true;
            break;
        }
        sleep(core.config.poll_interval).await;
    }

    info!(stage = "DONE", action, converged);
    SplitBrainHealResult {
        action,
        status: if converged {
            ScenarioStatus::Ok
        } else {
            ScenarioStatus::Partial
        },
        converged,
        isolate_seconds,
        verify_polls,
        groups: Some(groups),
        message,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

/// `START → CREATING → INJECTING → VERIFYING → DONE`.
///
/// Creates `create_nodes` nodes, injects `events_per_node` synthetic
/// events into every roster node (types round-robin), then polls until
/// every per-node root agrees.
pub async fn bootstrap_converge(
    core: &GatewayCore,
    create_nodes: usize,
    events_per_node: usize,
    verify_polls: u32,
) -> BootstrapConvergeResult {
    const KINDS: [&str; 3] = ["water_level", "injured_count", "road_status"];
    const LOCATIONS: [&str; 3] = ["bridge_north", "shelter_east", "highway_101"];

    let action = "bootstrap-converge";
    let started = Instant::now();
    let deadline = started + core.config.scenario_deadline;

    info!(stage = "START", action, create_nodes, events_per_node, verify_polls);

    info!(stage = "CREATING", action, count = create_nodes);
    let batch = core.chaos.create_nodes_batch(create_nodes).await;
    let mut failures = batch.failures.clone();
    if create_nodes > 0 && batch.created_count == 0 {
        warn!(stage = "DONE", action, "no node could be created");
        return BootstrapConvergeResult {
            action,
            status: ScenarioStatus::Failed,
            converged: false,
            created_count: 0,
            successful_events: 0,
            failed_events: 0,
            failures,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
    }

    // Give freshly created intake servers a beat to bind.
    sleep(core.config.poll_interval).await;

    info!(stage = "INJECTING", action, per_node = events_per_node);
    let client = core.poller.client();
    let mut successful_events = 0;
    let mut failed_events = 0;
    let mut seq = 0usize;
    for descriptor in core.roster.list() {
        for _ in 0..events_per_node {
            let body = json!({
                "type": KINDS[seq % KINDS.len()],
                "value": seq,
                "location": LOCATIONS[seq % LOCATIONS.len()],
            });
            seq += 1;
            let url = format!("{}/event", descriptor.url.trim_end_matches('/'));
            match client.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => successful_events += 1,
                Ok(response) => {
                    failed_events += 1;
                    failures.push(format!("{}: HTTP {}", descriptor.node_id, response.status()));
                }
                Err(err) => {
                    failed_events += 1;
                    failures.push(format!("{}: {err}", descriptor.node_id));
                }
            }
        }
    }

    info!(stage = "VERIFYING", action, polls = verify_polls);
    let roster_size = core.roster.len();
    let mut converged = false;
    for _ in 0..verify_polls {
        if Instant::now() >= deadline {
            warn!(action, "scenario deadline expired during verification");
            break;
        }
        let summary = core.run_poll_cycle().await;
        if summary.reachable_nodes == roster_size && roster_size > 0 && !summary.is_divergent {
            converged = true;
            break;
        }
        sleep(core.config.poll_interval).await;
    }

    info!(stage = "DONE", action, converged);
    BootstrapConvergeResult {
        action,
        status: if converged {
            ScenarioStatus::Ok
        } else {
            ScenarioStatus::Partial
        },
        converged,
        created_count: batch.created_count,
        successful_events,
        failed_events,
        failures,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}
