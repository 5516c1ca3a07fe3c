//! edgemesh gateway library.
//!
//! The gateway observes the fleet without being part of it: a scheduled
//! poller fetches every node's snapshot, a merger consolidates them with
//! the same CRDT semantics the nodes use, a divergence tracker records
//! whether the fleet currently fingerprint-matches, and a chaos
//! controller (behind an orchestrator port) induces the partitions the
//! whole system exists to survive.
//!
//! # Components
//!
//! - [`Roster`] — fleet membership and per-node reachability state
//! - [`FleetPoller`] — concurrent snapshot fetches with bounded retries
//! - [`merge_snapshots`] — consolidation into a fresh replica each poll
//! - [`DivergenceTracker`] — bounded ring of convergence observations
//! - [`MetricsRegistry`] — counters + bounded time series
//! - [`OrchestratorPort`] — container runtime seam (Docker impl + fake)
//! - [`ChaosController`] — isolate / heal / split-brain / node lifecycle
//! - [`scenarios`] — scripted state machines over all of the above

mod chaos;
mod core;
mod divergence;
mod http;
mod merger;
pub mod metrics;
mod orchestrator;
mod poller;
mod roster;
pub mod scenarios;

pub use chaos::{BatchReport, ChaosController, HealAllReport, SplitBrainReport};
pub use core::{CycleSummary, GatewayConfig, GatewayCore};
pub use divergence::{DivergenceRecord, DivergenceTracker, DIVERGENCE_RING_CAP};
pub use http::build_router;
pub use merger::{merge_snapshots, MergeOutcome};
pub use metrics::{MetricsRegistry, Sample, MAX_SERIES_SAMPLES};
pub use orchestrator::{
    fake::FakeOrchestrator, DockerConfig, DockerOrchestrator, OrchestratorError, OrchestratorPort,
    OrchestratorResult,
};
pub use poller::{FleetPoller, PollOutcome, DEFAULT_FETCH_TIMEOUT, MAX_RETRIES};
pub use roster::{NodeDescriptor, NodeStatus, Roster, UNREACHABLE_AFTER_FAILURES};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// User-visible gateway errors; the HTTP layer maps each to a status.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Bad request parameters.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The node is not in the roster.
    #[error("unknown node: {0}")]
    NotFound(String),

    /// The gateway-wide operation mutex is held.
    #[error("another operation is in progress")]
    Busy,

    /// The container runtime failed.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}
