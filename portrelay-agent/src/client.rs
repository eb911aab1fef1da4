//! Controller-side client of a remote agent.

use crate::models::{ApiResponse, CreateTunnelRequest, NodeStatus};
use async_trait::async_trait;
use portrelay_common::{RelayError, Result, NODE_KEY_HEADER};
use portrelay_core::{Rule, RuleControl, TunnelStatus};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Drives the rules of one agent over HTTP.
#[derive(Debug, Clone)]
pub struct AgentClient {
    base_url: String,
    node_key: String,
    http: reqwest::Client,
}

impl AgentClient {
    pub fn new(base_url: &str, node_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            node_key: node_key.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        id: Option<&str>,
    ) -> Result<Option<T>> {
        let response = request
            .header(NODE_KEY_HEADER, &self.node_key)
            .send()
            .await
            .map_err(|e| RelayError::Remote(e.to_string()))?;

        let status = response.status();
        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| RelayError::Remote(format!("{status}: {e}")))?;

        if status.is_success() && body.success {
            return Ok(body.data);
        }

        let message = body.message.unwrap_or_else(|| status.to_string());
        Err(match (status, id) {
            (StatusCode::NOT_FOUND, Some(id)) => RelayError::RuleNotFound(id.to_string()),
            _ => RelayError::Remote(message),
        })
    }

    pub async fn node_status(&self) -> Result<NodeStatus> {
        self.send(self.http.get(self.url("/status")), None)
            .await?
            .ok_or_else(|| RelayError::Remote("status response without data".into()))
    }
}

#[async_trait]
impl RuleControl for AgentClient {
    async fn create(&self, rule: Rule, auto_start: bool) -> Result<()> {
        let body = CreateTunnelRequest::from((&rule, auto_start));
        self.send::<serde_json::Value>(self.http.post(self.url("/tunnels")).json(&body), None)
            .await?;
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/tunnels/{id}/start"));
        self.send::<serde_json::Value>(self.http.post(url), Some(id))
            .await?;
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/tunnels/{id}/stop"));
        self.send::<serde_json::Value>(self.http.post(url), Some(id))
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/tunnels/{id}"));
        self.send::<serde_json::Value>(self.http.delete(url), Some(id))
            .await?;
        Ok(())
    }

    async fn status(&self) -> Result<Vec<TunnelStatus>> {
        Ok(self.node_status().await?.tunnels)
    }
}
