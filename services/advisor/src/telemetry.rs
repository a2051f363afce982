//! Telemetry backend client.
//!
//! The spike detector consumes an abstract scalar-query capability; the
//! production implementation wraps the telemetry backend's HTTP query API.
//! The client never retries; interpreting failures is the detector's job.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Errors from a scalar query.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The backend could not be reached within the configured timeout.
    #[error("telemetry backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered, but not with a usable scalar.
    #[error("bad telemetry response: {0}")]
    BadResponse(String),
}

/// A source of scalar readings, one query expression at a time.
///
/// An empty result set reads as `0.0`.
#[async_trait]
pub trait ScalarSource: Send + Sync {
    async fn query_scalar(&self, expr: &str) -> Result<f64, TelemetryError>;

    /// Liveness probe. Defaults to a successful `up` query.
    async fn is_reachable(&self) -> bool {
        self.query_scalar("up").await.is_ok()
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: QueryData,
}

#[derive(Debug, Default, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<QuerySample>,
}

/// One instant-vector sample; `value` is `[timestamp, "value"]`.
#[derive(Debug, Deserialize)]
struct QuerySample {
    value: (f64, String),
}

/// HTTP client for the telemetry backend's instant-query API.
pub struct PromClient {
    base_url: String,
    client: reqwest::Client,
}

impl PromClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl ScalarSource for PromClient {
    async fn query_scalar(&self, expr: &str) -> Result<f64, TelemetryError> {
        let url = format!("{}/api/v1/query", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("query", expr)])
            .send()
            .await
            .map_err(|e| TelemetryError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TelemetryError::BadResponse(format!(
                "status {}",
                response.status()
            )));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| TelemetryError::BadResponse(e.to_string()))?;

        if body.status != "success" {
            return Err(TelemetryError::BadResponse(format!(
                "query status {}",
                body.status
            )));
        }

        let Some(sample) = body.data.result.first() else {
            return Ok(0.0);
        };

        sample
            .value
            .1
            .parse::<f64>()
            .map_err(|e| TelemetryError::BadResponse(format!("unparseable sample value: {e}")))
    }
}
