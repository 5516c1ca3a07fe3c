//! The gossip service loop.
//!
//! One task per node, one UDP socket, two duties interleaved with
//! `tokio::select!`: a jittered broadcast timer and the inbound datagram
//! handler. Replies always go to the datagram's source address, so peers
//! only need to know each other's gossip addresses, not their HTTP ports.

use crate::protocol::{fragment_snapshot, GossipMessage, MAX_DATAGRAM};
use crate::reassembly::ReassemblyBuffer;
use crate::Result;
use edgemesh_replica::{ReplicaStore, ReplicaWire};
use edgemesh_types::{now_ms, NodeId};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Gossip timing and addressing.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Address the UDP socket binds to.
    pub bind_addr: SocketAddr,
    /// Gossip addresses of every peer.
    pub peers: Vec<SocketAddr>,
    /// Broadcast period (jittered ± 10% each tick).
    pub interval: Duration,
    /// How long partial snapshots are kept before being discarded.
    pub reassembly_timeout: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9000".parse().expect("valid default addr"),
            peers: Vec::new(),
            interval: Duration::from_secs(5),
            reassembly_timeout: Duration::from_secs(5),
        }
    }
}

/// Counters shared with the intake side for `/status`.
#[derive(Debug, Default)]
pub struct GossipStats {
    /// DIGEST datagrams sent.
    pub digests_sent: AtomicU64,
    /// PULL_REQ datagrams sent.
    pub pulls_sent: AtomicU64,
    /// Snapshots served in response to pulls.
    pub snapshots_sent: AtomicU64,
    /// Snapshots merged into the local replica.
    pub merges_applied: AtomicU64,
    /// Datagrams dropped as unparseable.
    pub malformed_packets: AtomicU64,
    /// Wall-clock ms when a peer was last heard (0 = never).
    last_peer_contact_ms: AtomicU64,
}

impl GossipStats {
    fn mark_peer_contact(&self) {
        self.last_peer_contact_ms.store(now_ms(), Ordering::Relaxed);
    }

    /// Wall-clock ms of the last valid peer datagram, if any.
    #[must_use]
    pub fn last_peer_contact_ms(&self) -> Option<u64> {
        match self.last_peer_contact_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    /// True when no peer has been heard within `window`.
    ///
    /// This is how a node notices it has been cut off: iptables isolation
    /// is invisible locally except as silence.
    #[must_use]
    pub fn silent_for(&self, window: Duration) -> bool {
        match self.last_peer_contact_ms() {
            Some(ms) => now_ms().saturating_sub(ms) > window.as_millis() as u64,
            None => true,
        }
    }
}

/// The per-node gossip task.
pub struct GossipService {
    node_id: NodeId,
    store: Arc<ReplicaStore>,
    socket: UdpSocket,
    config: GossipConfig,
    reassembly: ReassemblyBuffer,
    stats: Arc<GossipStats>,
}

impl GossipService {
    /// Binds the gossip socket.
    pub async fn bind(
        config: GossipConfig,
        store: Arc<ReplicaStore>,
        stats: Arc<GossipStats>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        let node_id = store.node_id().clone();
        info!(
            node_id = %node_id,
            addr = %socket.local_addr()?,
            peers = config.peers.len(),
            "gossip socket bound"
        );
        Ok(Self {
            node_id,
            store,
            socket,
            reassembly: ReassemblyBuffer::new(config.reassembly_timeout),
            config,
            stats,
        })
    }

    /// The bound socket address (useful when binding to port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Replaces the peer list.
    ///
    /// Needed when peers bind to OS-assigned ports and addresses are only
    /// known after every socket exists.
    pub fn set_peers(&mut self, peers: Vec<SocketAddr>) {
        self.config.peers = peers;
    }

    /// Runs the gossip loop forever.
    pub async fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut next_tick = Instant::now() + jittered(self.config.interval);

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_tick) => {
                    self.broadcast_digest().await;
                    self.reassembly.sweep(std::time::Instant::now());
                    next_tick = Instant::now() + jittered(self.config.interval);
                }
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, src)) => self.handle_datagram(&buf[..len], src).await,
                        Err(err) => warn!(%err, "gossip recv failed"),
                    }
                }
            }
        }
    }

    async fn broadcast_digest(&self) {
        let digest = GossipMessage::Digest {
            node_id: self.node_id.clone(),
            version: self.store.version().await,
            merkle_root: self.store.merkle_root_hex().await,
        };
        for peer in &self.config.peers {
            self.send(&digest, *peer).await;
            self.stats.digests_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn handle_datagram(&mut self, bytes: &[u8], src: SocketAddr) {
        let message = match GossipMessage::from_bytes(bytes) {
            Ok(message) => message,
            Err(err) => {
                self.stats.malformed_packets.fetch_add(1, Ordering::Relaxed);
                debug!(%src, %err, "dropped malformed datagram");
                return;
            }
        };
        self.stats.mark_peer_contact();

        match message {
            GossipMessage::Digest {
                node_id,
                merkle_root,
                ..
            } => {
                if merkle_root != self.store.merkle_root_hex().await {
                    debug!(peer = %node_id, "digest differs, pulling");
                    let pull = GossipMessage::PullReq {
                        node_id: self.node_id.clone(),
                        version: self.store.version().await,
                        since_version: 0,
                    };
                    self.send(&pull, src).await;
                    self.stats.pulls_sent.fetch_add(1, Ordering::Relaxed);
                }
            }

            GossipMessage::PullReq { node_id, .. } => {
                let snapshot = self.store.snapshot().await;
                match fragment_snapshot(&snapshot) {
                    Ok(fragments) => {
                        debug!(peer = %node_id, fragments = fragments.len(), "serving snapshot");
                        for fragment in &fragments {
                            self.send(fragment, src).await;
                        }
                        self.stats.snapshots_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => warn!(%err, "snapshot fragmentation failed"),
                }
            }

            GossipMessage::State {
                node_id,
                frag_id,
                index,
                total,
                payload,
                ..
            } => {
                let completed = match self.reassembly.insert(
                    frag_id,
                    index,
                    total,
                    &payload,
                    std::time::Instant::now(),
                ) {
                    Ok(completed) => completed,
                    Err(err) => {
                        self.stats.malformed_packets.fetch_add(1, Ordering::Relaxed);
                        debug!(peer = %node_id, %err, "dropped bad fragment");
                        return;
                    }
                };

                if let Some(bytes) = completed {
                    self.apply_snapshot(&bytes, &node_id).await;
                }
            }
        }
    }

    async fn apply_snapshot(&self, bytes: &[u8], from: &NodeId) {
        let wire: ReplicaWire = match serde_json::from_slice(bytes) {
            Ok(wire) => wire,
            Err(err) => {
                self.stats.malformed_packets.fetch_add(1, Ordering::Relaxed);
                debug!(peer = %from, %err, "dropped unparseable snapshot");
                return;
            }
        };
        match self.store.merge(&wire).await {
            Ok(report) => {
                self.stats.merges_applied.fetch_add(1, Ordering::Relaxed);
                if report.new_events > 0 {
                    debug!(
                        peer = %from,
                        new_events = report.new_events,
                        "snapshot merged"
                    );
                }
            }
            Err(err) => warn!(peer = %from, %err, "snapshot merge rejected"),
        }
    }

    async fn send(&self, message: &GossipMessage, to: SocketAddr) {
        match message.to_bytes() {
            Ok(bytes) => {
                if let Err(err) = self.socket.send_to(&bytes, to).await {
                    debug!(%to, %err, "gossip send failed");
                }
            }
            Err(err) => warn!(%err, "gossip encode failed"),
        }
    }
}

fn jittered(interval: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.9..=1.1);
    interval.mul_f64(factor)
}
