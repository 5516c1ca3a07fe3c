//! edgemesh edge node
//!
//! Runs the three coresident components of an edge node:
//! 1. the replica store (CRDTs + hash-chain log), replayed from disk
//! 2. the UDP gossip task diffusing state to peers
//! 3. the intake HTTP API
//!
//! Usage:
//!   edgemesh-node --node-id node1 --http-port 8001 --gossip-port 9000 \
//!     --peer 10.0.0.2:9000 --peer 10.0.0.3:9000

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use edgemesh_gossip::{GossipConfig, GossipService, GossipStats};
use edgemesh_node::{build_router, NodeState};
use edgemesh_replica::ReplicaStore;
use edgemesh_types::NodeId;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "edgemesh-node")]
#[command(about = "edgemesh edge node: telemetry intake + replica + gossip")]
struct Args {
    /// This node's id (also names the log file)
    #[arg(long, default_value = "node1")]
    node_id: String,

    /// Intake HTTP port
    #[arg(long, default_value = "8001")]
    http_port: u16,

    /// Gossip UDP port
    #[arg(long, default_value = "9000")]
    gossip_port: u16,

    /// Peer gossip address (host:port); repeat for each peer
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Directory for the append-only replica log
    #[arg(long, default_value = "/data/logs")]
    data_dir: PathBuf,

    /// Gossip broadcast period in milliseconds
    #[arg(long, default_value = "5000")]
    gossip_interval_ms: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let node_id = NodeId::new(args.node_id.clone());
    let log_path = args.data_dir.join(format!("{}.log", args.node_id));
    info!(node_id = %node_id, log = %log_path.display(), "edge node starting");

    let store = Arc::new(
        ReplicaStore::open(node_id.clone(), &log_path)
            .await
            .context("failed to open replica log")?,
    );

    let peers: Vec<SocketAddr> = args
        .peers
        .iter()
        .map(|peer| {
            peer.parse()
                .with_context(|| format!("invalid peer address {peer:?}"))
        })
        .collect::<Result<_>>()?;
    let gossip_interval = Duration::from_millis(args.gossip_interval_ms);

    let stats = Arc::new(GossipStats::default());
    let gossip = GossipService::bind(
        GossipConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], args.gossip_port)),
            peers,
            interval: gossip_interval,
            reassembly_timeout: Duration::from_secs(5),
        },
        store.clone(),
        stats.clone(),
    )
    .await
    .context("failed to bind gossip socket")?;

    tokio::spawn(async move {
        if let Err(err) = gossip.run().await {
            error!(%err, "gossip loop exited");
        }
    });

    let state = Arc::new(NodeState {
        store,
        stats,
        peers: args.peers,
        gossip_interval,
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], args.http_port)))
        .await
        .context("failed to bind intake port")?;
    info!(port = args.http_port, "intake API listening");
    axum::serve(listener, app).await.context("intake server failed")?;
    Ok(())
}
