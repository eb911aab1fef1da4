//! Keyed collection of engines, one per rule id.
//!
//! The map lock only guards add/remove/lookup. Engines are cloned out as
//! `Arc`s before any start or stop, so it is never held across socket work.

use crate::engine::{Engine, TunnelStatus};
use crate::rule::Rule;
use portrelay_common::{EngineConfig, RelayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{info, warn};

/// Sum of every engine's traffic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalTraffic {
    pub total_in: u64,
    pub total_out: u64,
    pub rate_in: f64,
    pub rate_out: f64,
}

pub struct Manager {
    engines: RwLock<HashMap<String, Arc<Engine>>>,
    config: Arc<EngineConfig>,
    started_at: Instant,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Manager {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engines: RwLock::new(HashMap::new()),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn get(&self, id: &str) -> Result<Arc<Engine>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::RuleNotFound(id.to_string()))
    }

    fn snapshot(&self) -> Vec<Arc<Engine>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Register a rule and start it when enabled.
    ///
    /// A start failure is logged but the rule stays registered, stopped, so
    /// it can be started once the port frees up.
    pub async fn add_rule(&self, rule: Rule) -> Result<()> {
        rule.validate()?;
        let enabled = rule.enabled;
        let id = rule.id.clone();

        let engine = {
            let mut engines = self.engines.write().unwrap_or_else(PoisonError::into_inner);
            if engines.contains_key(&id) {
                return Err(RelayError::RuleExists(id));
            }
            let engine = Arc::new(Engine::with_config(rule, self.config.clone()));
            engines.insert(id.clone(), engine.clone());
            engine
        };
        info!(rule_id = %id, "Rule added");

        if enabled {
            if let Err(e) = engine.start().await {
                warn!(rule_id = %id, error = %e, "Rule added but not started");
            }
        }
        Ok(())
    }

    /// Replace a rule, restarting its engine so the new snapshot applies.
    pub async fn update_rule(&self, rule: Rule) -> Result<()> {
        rule.validate()?;
        let engine = self.get(&rule.id)?;
        let enabled = rule.enabled;

        engine.stop_and_wait().await;
        engine.update_rule(rule)?;
        if enabled {
            engine.start().await?;
        }
        Ok(())
    }

    /// Stop and forget a rule.
    pub async fn delete_rule(&self, id: &str) -> Result<()> {
        let engine = self
            .engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .ok_or_else(|| RelayError::RuleNotFound(id.to_string()))?;

        engine.stop_and_wait().await;
        info!(rule_id = %id, "Rule deleted");
        Ok(())
    }

    /// Start or stop a rule according to `enabled`.
    pub async fn toggle_rule(&self, id: &str, enabled: bool) -> Result<()> {
        let engine = self.get(id)?;
        if enabled {
            engine.start().await
        } else {
            engine.stop();
            Ok(())
        }
    }

    pub async fn start_rule(&self, id: &str) -> Result<()> {
        self.get(id)?.start().await
    }

    pub fn stop_rule(&self, id: &str) -> Result<()> {
        self.get(id)?.stop();
        Ok(())
    }

    pub fn status(&self, id: &str) -> Result<TunnelStatus> {
        Ok(self.get(id)?.get_status())
    }

    /// Status of every engine, ordered by rule id.
    pub fn all_status(&self) -> Vec<TunnelStatus> {
        let mut statuses: Vec<_> = self.snapshot().iter().map(|e| e.get_status()).collect();
        statuses.sort_by(|a, b| a.rule.id.cmp(&b.rule.id));
        statuses
    }

    pub fn all_rules(&self) -> Vec<Rule> {
        let mut rules: Vec<_> = self.snapshot().iter().map(|e| e.rule()).collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    pub fn global_traffic(&self) -> GlobalTraffic {
        self.all_status()
            .iter()
            .fold(GlobalTraffic::default(), |mut acc, status| {
                acc.total_in += status.traffic.total_in;
                acc.total_out += status.traffic.total_out;
                acc.rate_in += status.traffic.bytes_in_rate;
                acc.rate_out += status.traffic.bytes_out_rate;
                acc
            })
    }

    /// Number of running engines.
    pub fn active_count(&self) -> usize {
        self.snapshot().iter().filter(|e| e.is_running()).count()
    }

    pub fn len(&self) -> usize {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seconds since this manager was created.
    pub fn uptime(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// One rate sample for every engine.
    pub fn update_all_rates(&self) {
        for engine in self.snapshot() {
            engine.update_rates();
        }
    }

    /// Stop every engine and wait for their protocol loops to exit.
    pub async fn stop_all(&self) {
        let engines = self.snapshot();
        let count = engines.len();
        for engine in engines {
            engine.stop_and_wait().await;
        }
        info!(count, "All tunnels stopped");
    }
}
