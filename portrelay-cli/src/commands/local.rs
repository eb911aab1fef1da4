//! Local subcommand: relay rules from a JSON file on this machine.

use anyhow::{Context, Result};
use clap::Args;
use portrelay_common::EngineConfig;
use portrelay_core::{Manager, Protocol, Rule};
use portrelay_observability::{init_basic_observability, LogFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Args, Debug)]
pub struct LocalArgs {
    /// JSON array of rules
    #[arg(long, env = "PORTRELAY_RULES")]
    rules: PathBuf,

    /// Log output format: pretty or json
    #[arg(long, default_value = "pretty", env = "PORTRELAY_LOG_FORMAT")]
    log_format: LogFormat,

    /// Seconds between status summaries logged at debug level
    #[arg(long, default_value_t = 10)]
    summary_interval: u64,
}

/// One entry of the rules file. `id` defaults to a fresh UUID and
/// `enabled` to true.
#[derive(Debug, Deserialize)]
struct RuleEntry {
    id: Option<String>,
    name: Option<String>,
    local_port: u16,
    target_ip: String,
    target_port: u16,
    #[serde(default)]
    protocol: Protocol,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl From<RuleEntry> for Rule {
    fn from(entry: RuleEntry) -> Self {
        let id = entry
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut rule = Rule::new(
            id,
            entry.local_port,
            entry.target_ip,
            entry.target_port,
            entry.protocol,
        );
        if let Some(name) = entry.name {
            rule.name = name;
        }
        rule.enabled = entry.enabled;
        rule
    }
}

fn load_rules(path: &Path) -> Result<Vec<Rule>> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_rules(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn parse_rules(raw: &str) -> Result<Vec<Rule>> {
    let entries: Vec<RuleEntry> = serde_json::from_str(raw)?;
    Ok(entries.into_iter().map(Rule::from).collect())
}

pub async fn run(args: LocalArgs) -> Result<()> {
    init_basic_observability(args.log_format, false);

    let manager = Arc::new(Manager::new(EngineConfig::default()));
    for rule in load_rules(&args.rules)? {
        let id = rule.id.clone();
        manager
            .add_rule(rule)
            .await
            .with_context(|| format!("registering rule {id}"))?;
    }
    info!(
        rules = manager.len(),
        active = manager.active_count(),
        "Local relay running"
    );

    let shutdown = super::shutdown_token();
    let mut rate_tick = tokio::time::interval(Duration::from_secs(1));
    let mut summary = tokio::time::interval(Duration::from_secs(args.summary_interval.max(1)));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = rate_tick.tick() => manager.update_all_rates(),
            _ = summary.tick() => {
                let traffic = manager.global_traffic();
                debug!(
                    active = manager.active_count(),
                    total_in = traffic.total_in,
                    total_out = traffic.total_out,
                    rate_in = traffic.rate_in,
                    rate_out = traffic.rate_out,
                    uptime = manager.uptime(),
                    "Relay summary"
                );
            }
        }
    }

    manager.stop_all().await;
    Ok(())
}
