//! edgemesh gateway
//!
//! Observes an edge-node fleet: polls every node's replica snapshot,
//! consolidates them, tracks divergence, and exposes chaos/scenario
//! endpoints for partition testing.
//!
//! Usage:
//!   edgemesh-gateway --port 8000 \
//!     --node node1=http://edge-node1:8001 \
//!     --node node2=http://edge-node2:8001

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgemesh_gateway::{
    build_router, DockerConfig, DockerOrchestrator, GatewayConfig, GatewayCore, NodeDescriptor,
};
use edgemesh_types::NodeId;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "edgemesh-gateway")]
#[command(about = "edgemesh fleet gateway: polling, consolidation, chaos")]
struct Args {
    /// Gateway HTTP port
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Seed node, `id=url`; repeat for each node
    #[arg(long = "node")]
    nodes: Vec<String>,

    /// Background poll period in milliseconds
    #[arg(long, default_value = "2000")]
    poll_interval_ms: u64,

    /// Per-fetch deadline in milliseconds
    #[arg(long, default_value = "1500")]
    fetch_timeout_ms: u64,

    /// Total scenario deadline in seconds
    #[arg(long, default_value = "60")]
    scenario_deadline_secs: u64,

    /// Node container image
    #[arg(long, default_value = "edgemesh-node:latest")]
    docker_image: String,

    /// Docker network the mesh lives on
    #[arg(long, default_value = "edgemesh")]
    docker_network: String,

    /// Mesh subnet for isolation rules
    #[arg(long, default_value = "172.28.0.0/16")]
    docker_subnet: String,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_seed(seed: &str) -> Result<NodeDescriptor> {
    match seed.split_once('=') {
        Some((id, url)) if !id.is_empty() && !url.is_empty() => Ok(NodeDescriptor::running(
            NodeId::new(id),
            url.to_string(),
            false,
        )),
        _ => bail!("expected id=url, got {seed:?}"),
    }
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

    let seeds: Vec<NodeDescriptor> = args
        .nodes
        .iter()
        .map(|seed| parse_seed(seed))
        .collect::<Result<_>>()?;

    let orchestrator = Arc::new(DockerOrchestrator::new(
        DockerConfig {
            image: args.docker_image.clone(),
            network: args.docker_network.clone(),
            subnet: args.docker_subnet.clone(),
            ..DockerConfig::default()
        },
        seeds.iter().map(NodeDescriptor::host).collect(),
    ));

    let core = Arc::new(GatewayCore::new(
        orchestrator,
        GatewayConfig {
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            fetch_timeout: Duration::from_millis(args.fetch_timeout_ms),
            scenario_deadline: Duration::from_secs(args.scenario_deadline_secs),
        },
    ));
    for seed in seeds {
        info!(node_id = %seed.node_id, url = %seed.url, "seeding roster");
        core.roster.insert(seed);
    }

    // Background poll loop.
    let poll_core = core.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_core.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            poll_core.run_poll_cycle().await;
        }
    });

    let app = build_router(core);
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], args.port)))
        .await
        .context("failed to bind gateway port")?;
    info!(port = args.port, "gateway API listening");
    axum::serve(listener, app).await.context("gateway server failed")?;
    Ok(())
}
