//! Bakery demo
//!
//! Every node stirs a dough and hands it to a random peer. Whoever receives
//! STIRRED bakes it and passes it on as BAKED; whoever receives BAKED eats
//! it. Meanwhile the nodes elect a leader, and the leader keeps collecting
//! every node's log into one causally ordered file.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};
use wavelog_agent::{LogNode, NodeCommand, NodeConfig, NodeEvent, NodeHandle};
use wavelog_core::PeerId;
use wavelog_transport::MemoryNetwork;

/// Arguments of `wavelog bakery`
#[derive(Args)]
pub struct BakeryArgs {
    /// Number of bakers
    #[arg(short = 'n', long, default_value = "3")]
    pub nodes: usize,

    /// Seconds to run before every node terminates
    #[arg(short, long, default_value = "10")]
    pub wait: u64,

    /// Write every node's time-space trace on termination
    #[arg(long)]
    pub dump: bool,

    /// Directory of the node logs and the ordered log
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Node config file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl BakeryArgs {
    fn node_config(&self, verbose: bool) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load_from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => NodeConfig::default(),
        };
        if let Some(dir) = &self.log_dir {
            config.log_dir.clone_from(dir);
        }
        config.dump_time_space |= self.dump;
        config.verbose |= verbose;
        config.validate()?;
        Ok(config)
    }
}

/// Run the demo until `wait` seconds have passed
pub async fn run(args: BakeryArgs, verbose: bool) -> Result<()> {
    anyhow::ensure!(args.nodes > 0, "at least one node is required");
    let config = args.node_config(verbose)?;
    let network = MemoryNetwork::new();

    let mut nodes = Vec::with_capacity(args.nodes);
    for _ in 0..args.nodes {
        nodes.push(LogNode::spawn(config.clone(), &network, PeerId::random())?);
    }
    info!(
        nodes = nodes.len(),
        log_dir = %config.log_dir.display(),
        "bakery open"
    );

    for node in &nodes {
        node.send(NodeCommand::Start)?;
        node.send(NodeCommand::SendRandom {
            content: "STIRRED".to_string(),
            owner: None,
        })?;
    }

    let deadline = Instant::now() + Duration::from_secs(args.wait);
    let mut bakers = JoinSet::new();
    for node in nodes {
        bakers.spawn(bake(node, deadline));
    }
    while let Some(joined) = bakers.join_next().await {
        joined.context("baker task failed")??;
    }
    info!(ordered = %config.ordered_log_path().display(), "bakery closed");
    Ok(())
}

/// Relay one node's bakery messages until `deadline`, then terminate it.
async fn bake(mut node: NodeHandle, deadline: Instant) -> Result<()> {
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, node.next_event()).await {
        match event {
            NodeEvent::Bakery { content, owner } => {
                let next = match content.as_str() {
                    "STIRRED" => Some("BAKED"),
                    "BAKED" => Some("EATEN"),
                    _ => None,
                };
                if let Some(next) = next {
                    node.send(NodeCommand::SendRandom {
                        content: next.to_string(),
                        owner: Some(owner),
                    })?;
                }
            }
            NodeEvent::ElectionDecided { leader, won } => {
                info!(peer = %node.peer(), leader = %leader, won, "leader known");
            }
            NodeEvent::LogsOrdered { path, records } => {
                info!(path = %path.display(), records, "logs ordered");
            }
            NodeEvent::CollectionFailed { code, reason } => {
                warn!(peer = %node.peer(), code, %reason, "collection failed");
            }
            NodeEvent::Stopped => {
                warn!(peer = %node.peer(), "node stopped early");
                break;
            }
        }
    }
    node.terminate().await?;
    Ok(())
}
