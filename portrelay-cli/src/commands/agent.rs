//! Agent subcommand implementation

use anyhow::{Context, Result};
use clap::Args;
use portrelay_agent::Agent;
use portrelay_common::AgentConfig;
use portrelay_observability::{init_basic_observability, LogFormat};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug)]
pub struct AgentArgs {
    /// JSON agent configuration; flags below override its fields
    #[arg(long, env = "PORTRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Address of the HTTP control surface
    #[arg(long, env = "PORTRELAY_LISTEN")]
    listen: Option<SocketAddr>,

    /// Shared secret expected in the X-Node-Key header
    #[arg(long, env = "PORTRELAY_NODE_KEY")]
    key: Option<String>,

    /// Display name reported in status and heartbeats
    #[arg(long, env = "PORTRELAY_NODE_NAME")]
    name: Option<String>,

    /// Controller base URL that receives heartbeats
    #[arg(long, env = "PORTRELAY_MASTER_URL")]
    master: Option<String>,

    /// Log output format: pretty or json
    #[arg(long, default_value = "pretty", env = "PORTRELAY_LOG_FORMAT")]
    log_format: LogFormat,

    /// Record Prometheus metrics, served on /metrics
    #[arg(long, env = "PORTRELAY_METRICS")]
    metrics: bool,
}

fn load_config(args: &AgentArgs) -> Result<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => AgentConfig::default(),
    };

    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(key) = &args.key {
        config.node_key.clone_from(key);
    }
    if let Some(name) = &args.name {
        config.node_name.clone_from(name);
    }
    if let Some(master) = &args.master {
        config.master_url = Some(master.clone());
    }
    Ok(config)
}

pub async fn run(args: AgentArgs) -> Result<()> {
    init_basic_observability(args.log_format, args.metrics);

    let config = load_config(&args)?;
    info!(
        "Starting portrelay agent v{} on {}",
        env!("CARGO_PKG_VERSION"),
        config.listen
    );

    let agent = Agent::new(config).context("invalid agent configuration")?;
    agent.run(super::shutdown_token()).await?;
    Ok(())
}
