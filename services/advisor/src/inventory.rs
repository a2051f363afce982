//! Orchestrator inventory client.
//!
//! Read-only list access to the orchestrator's workload and host inventory.
//! The advisor borrows these objects and never mutates them.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use surge_extender_api::{Host, Workload};

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory list failed: {0}")]
    ListFailed(String),
}

#[async_trait]
pub trait Inventory: Send + Sync {
    /// All workloads, across namespaces.
    async fn list_workloads(&self) -> Result<Vec<Workload>, InventoryError>;

    /// Workloads currently placed on the given host.
    async fn list_workloads_on(&self, host: &str) -> Result<Vec<Workload>, InventoryError>;

    /// All hosts.
    async fn list_hosts(&self) -> Result<Vec<Host>, InventoryError>;
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ListResponse<T> {
    #[serde(default)]
    items: Vec<T>,
}

const IN_CLUSTER_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const IN_CLUSTER_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";
const IN_CLUSTER_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// HTTP client for the orchestrator's list API.
pub struct HttpInventory {
    base_url: String,
    client: reqwest::Client,
}

impl HttpInventory {
    /// Construct from explicit configuration, falling back to the in-cluster
    /// environment. This is the advisor's only fatal initialization path.
    pub fn from_config(
        base_url: Option<&str>,
        token_file: Option<&PathBuf>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let base_url = match base_url {
            Some(url) => url.to_string(),
            None => {
                let host = std::env::var(IN_CLUSTER_HOST_ENV).map_err(|_| {
                    anyhow::anyhow!(
                        "no orchestrator URL configured and {IN_CLUSTER_HOST_ENV} is unset"
                    )
                })?;
                let port =
                    std::env::var(IN_CLUSTER_PORT_ENV).unwrap_or_else(|_| "443".to_string());
                format!("https://{host}:{port}")
            }
        };

        let mut headers = HeaderMap::new();
        let token_path = token_file.cloned().or_else(|| {
            let path = PathBuf::from(IN_CLUSTER_TOKEN_PATH);
            path.exists().then_some(path)
        });
        if let Some(path) = token_path {
            let token = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read token file {}", path.display()))?;
            let bearer = format!("Bearer {}", token.trim());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&bearer).context("invalid orchestrator token")?,
            );
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build orchestrator HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, InventoryError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| InventoryError::ListFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InventoryError::ListFailed(format!(
                "{path} returned status {}",
                response.status()
            )));
        }

        let body: ListResponse<T> = response
            .json()
            .await
            .map_err(|e| InventoryError::ListFailed(e.to_string()))?;
        Ok(body.items)
    }
}

#[async_trait]
impl Inventory for HttpInventory {
    async fn list_workloads(&self) -> Result<Vec<Workload>, InventoryError> {
        self.list("/api/v1/pods", &[]).await
    }

    async fn list_workloads_on(&self, host: &str) -> Result<Vec<Workload>, InventoryError> {
        let selector = format!("spec.nodeName={host}");
        self.list("/api/v1/pods", &[("fieldSelector", selector.as_str())])
            .await
    }

    async fn list_hosts(&self) -> Result<Vec<Host>, InventoryError> {
        self.list("/api/v1/nodes", &[]).await
    }
}
