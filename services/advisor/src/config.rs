//! Configuration for the advisor.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::service::DEFAULT_KNOWN_SERVICES;
use crate::spike::SpikeThresholds;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on for advisory and operator HTTP traffic.
    pub listen_addr: SocketAddr,

    /// Log level fallback when RUST_LOG is unset.
    pub log_level: String,

    /// Telemetry backend base URL.
    pub telemetry_url: String,

    /// Per-query telemetry timeout.
    pub telemetry_timeout: Duration,

    /// Aggregate request-rate threshold (requests/second).
    pub qps_threshold: f64,

    /// Server-error rate threshold (errors/second).
    pub error_rate_threshold: f64,

    /// p95 request latency threshold (milliseconds).
    pub p95_latency_threshold_ms: f64,

    /// Unscheduled-workload count that signals a spike when telemetry is
    /// unreachable.
    pub fallback_threshold: i64,

    /// Spike poller period.
    pub poll_interval: Duration,

    /// Cooldown checker period.
    pub cooldown_check_interval: Duration,

    /// Quiet period required before dissolution.
    pub cooldown: Duration,

    /// Orchestrator API base URL; in-cluster environment when unset.
    pub orchestrator_url: Option<String>,

    /// Bearer token file for the orchestrator API.
    pub orchestrator_token_file: Option<PathBuf>,

    /// Per-call orchestrator timeout.
    pub orchestrator_timeout: Duration,

    /// Known-service dictionary for service-identifier derivation.
    pub known_services: Vec<String>,

    /// Load built-in demonstration groups when no annotated workloads exist.
    pub builtin_groups: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("SURGE_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:9099".to_string())
            .parse()
            .context("invalid SURGE_LISTEN_ADDR")?;

        let log_level = std::env::var("SURGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let telemetry_url = std::env::var("SURGE_TELEMETRY_URL")
            .unwrap_or_else(|_| "http://prometheus-server.monitoring:80".to_string());

        Ok(Self {
            listen_addr,
            log_level,
            telemetry_url,
            telemetry_timeout: secs_var("SURGE_TELEMETRY_TIMEOUT_SECS", 5),
            qps_threshold: parsed_var("SURGE_QPS_THRESHOLD", 1000.0),
            error_rate_threshold: parsed_var("SURGE_ERROR_RATE_THRESHOLD", 50.0),
            p95_latency_threshold_ms: parsed_var("SURGE_P95_LATENCY_THRESHOLD_MS", 500.0),
            fallback_threshold: parsed_var("SURGE_FALLBACK_THRESHOLD", 5),
            poll_interval: secs_var("SURGE_POLL_INTERVAL_SECS", 10),
            cooldown_check_interval: secs_var("SURGE_COOLDOWN_CHECK_INTERVAL_SECS", 5),
            cooldown: secs_var("SURGE_COOLDOWN_SECS", 30),
            orchestrator_url: std::env::var("SURGE_ORCHESTRATOR_URL").ok(),
            orchestrator_token_file: std::env::var("SURGE_ORCHESTRATOR_TOKEN_FILE")
                .ok()
                .map(PathBuf::from),
            orchestrator_timeout: secs_var("SURGE_ORCHESTRATOR_TIMEOUT_SECS", 5),
            known_services: list_var("SURGE_KNOWN_SERVICES", DEFAULT_KNOWN_SERVICES),
            builtin_groups: bool_var("SURGE_BUILTIN_GROUPS", true),
        })
    }

    pub fn spike_thresholds(&self) -> SpikeThresholds {
        SpikeThresholds {
            qps: self.qps_threshold,
            error_rate: self.error_rate_threshold,
            p95_latency_ms: self.p95_latency_threshold_ms,
            fallback: self.fallback_threshold,
        }
    }
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn secs_var(name: &str, default: u64) -> Duration {
    Duration::from_secs(parsed_var(name, default))
}

fn bool_var(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|raw| raw == "1" || raw.to_lowercase() == "true")
        .unwrap_or(default)
}

fn list_var(name: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => default.iter().map(|entry| entry.to_string()).collect(),
    }
}
