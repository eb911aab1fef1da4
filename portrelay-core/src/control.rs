//! The four-call contract a controller drives rules through.
//!
//! [`Manager`] implements it in-process. A remote agent exposes the same
//! calls over HTTP and its client implements the trait on the other side,
//! so callers do not care where a rule actually runs.

use crate::engine::TunnelStatus;
use crate::manager::Manager;
use crate::rule::Rule;
use async_trait::async_trait;
use portrelay_common::Result;

#[async_trait]
pub trait RuleControl: Send + Sync {
    /// Register `rule`, starting it right away when `auto_start` is set.
    async fn create(&self, rule: Rule, auto_start: bool) -> Result<()>;

    async fn start(&self, id: &str) -> Result<()>;

    async fn stop(&self, id: &str) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn status(&self) -> Result<Vec<TunnelStatus>>;
}

#[async_trait]
impl RuleControl for Manager {
    async fn create(&self, mut rule: Rule, auto_start: bool) -> Result<()> {
        rule.enabled = false;
        let id = rule.id.clone();
        self.add_rule(rule).await?;
        if auto_start {
            self.start_rule(&id).await?;
        }
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.start_rule(id).await
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.stop_rule(id)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.delete_rule(id).await
    }

    async fn status(&self) -> Result<Vec<TunnelStatus>> {
        Ok(self.all_status())
    }
}
