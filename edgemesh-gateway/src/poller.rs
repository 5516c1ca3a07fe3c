//! Fleet polling.
//!
//! Every poll fetches `/state/snapshot` from all roster nodes
//! concurrently, with a hard per-call deadline and a small bounded retry
//! budget. A node that misses enough polls in a row is demoted to
//! `unreachable` but stays in the roster — it may just be on the wrong
//! side of a partition.

use crate::metrics::{self, MetricsRegistry};
use crate::roster::{NodeDescriptor, Roster};
use edgemesh_replica::ReplicaWire;
use edgemesh_types::NodeId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Retries after the first failed attempt.
pub const MAX_RETRIES: u32 = 2;

/// Backoff before each retry.
pub const RETRY_BACKOFF: [Duration; 2] = [Duration::from_millis(100), Duration::from_millis(300)];

/// Default per-call deadline.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(1500);

/// What one poll round produced.
#[derive(Debug)]
pub struct PollOutcome {
    /// Snapshots from every node that answered.
    pub snapshots: Vec<ReplicaWire>,
    /// Nodes that did not answer this round.
    pub unreachable: Vec<NodeId>,
}

/// Concurrent snapshot fetcher over the roster.
pub struct FleetPoller {
    client: reqwest::Client,
    roster: Arc<Roster>,
    metrics: Arc<MetricsRegistry>,
}

impl FleetPoller {
    /// Creates a poller whose HTTP calls time out after `fetch_timeout`.
    pub fn new(
        roster: Arc<Roster>,
        metrics: Arc<MetricsRegistry>,
        fetch_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .expect("reqwest client builds");
        Self {
            client,
            roster,
            metrics,
        }
    }

    /// The underlying HTTP client (shared with scenario event injection).
    #[must_use]
    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }

    /// Fetches a snapshot from every roster node concurrently.
    pub async fn poll_once(&self) -> PollOutcome {
        let targets = self.roster.list();
        let fetches = targets
            .iter()
            .map(|descriptor| self.fetch_with_retries(descriptor));
        let results = futures::future::join_all(fetches).await;

        let mut snapshots = Vec::new();
        let mut unreachable = Vec::new();
        for (descriptor, result) in targets.iter().zip(results) {
            match result {
                Some(wire) => {
                    self.roster.record_success(&descriptor.node_id);
                    self.metrics.incr(metrics::TOTAL_HTTP_SUCCESS, 1);
                    snapshots.push(wire);
                }
                None => {
                    let failures = self.roster.record_failure(&descriptor.node_id);
                    self.metrics.incr(metrics::TOTAL_HTTP_FAILURES, 1);
                    warn!(
                        node_id = %descriptor.node_id,
                        consecutive_failures = failures,
                        "node unreachable this poll"
                    );
                    unreachable.push(descriptor.node_id.clone());
                }
            }
        }
        PollOutcome {
            snapshots,
            unreachable,
        }
    }

    async fn fetch_with_retries(&self, descriptor: &NodeDescriptor) -> Option<ReplicaWire> {
        let url = format!("{}/state/snapshot", descriptor.url.trim_end_matches('/'));
        let mut attempt = 0;
        loop {
            match self.fetch(&url).await {
                Ok(wire) => return Some(wire),
                Err(err) => {
                    if attempt >= MAX_RETRIES {
                        debug!(node_id = %descriptor.node_id, %err, "all fetch attempts failed");
                        return None;
                    }
                    self.metrics.incr(metrics::HTTP_RETRIES, 1);
                    tokio::time::sleep(RETRY_BACKOFF[attempt as usize]).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<ReplicaWire, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<ReplicaWire>()
            .await
    }
}
