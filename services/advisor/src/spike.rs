//! Spike detection.
//!
//! The gatekeeper for the whole advisor: evaluates a disjunction of
//! threshold predicates over telemetry readings, in order, short-circuiting
//! on the first satisfied one. Without a spike the advisor stays dormant.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::telemetry::ScalarSource;

/// Aggregate request rate across services, per second.
pub const QPS_QUERY: &str = "sum(rate(http_server_request_count[1m]))";
/// Server-error (5xx) rate, per second.
pub const ERROR_RATE_QUERY: &str =
    r#"sum(rate(http_server_request_count{response_code=~"5.."}[1m]))"#;
/// p95 request latency in milliseconds.
pub const P95_LATENCY_QUERY: &str = "histogram_quantile(0.95, sum(rate(http_server_request_duration_seconds_bucket[1m])) by (le)) * 1000";
/// Horizontal-autoscaler replica increase over the last two minutes.
pub const HPA_SCALE_UP_QUERY: &str =
    "increase(kube_horizontalpodautoscaler_status_current_replicas[2m])";

#[derive(Debug, Clone)]
pub struct SpikeThresholds {
    pub qps: f64,
    pub error_rate: f64,
    pub p95_latency_ms: f64,
    /// Unscheduled-workload count that signals a spike when the telemetry
    /// backend is unreachable.
    pub fallback: i64,
}

impl Default for SpikeThresholds {
    fn default() -> Self {
        Self {
            qps: 1000.0,
            error_rate: 50.0,
            p95_latency_ms: 500.0,
            fallback: 5,
        }
    }
}

pub struct SpikeDetector {
    source: Arc<dyn ScalarSource>,
    thresholds: SpikeThresholds,
}

impl SpikeDetector {
    pub fn new(source: Arc<dyn ScalarSource>, thresholds: SpikeThresholds) -> Self {
        Self { source, thresholds }
    }

    /// Returns true if any spike indicator exceeds its threshold.
    ///
    /// `fallback_signal` is consulted only when the telemetry backend is
    /// unreachable. A failed individual query counts as "predicate not
    /// satisfied" and never blocks the remaining predicates.
    pub async fn detect(&self, fallback_signal: i64) -> bool {
        if !self.source.is_reachable().await {
            debug!(
                fallback_signal,
                threshold = self.thresholds.fallback,
                "telemetry unreachable, using unscheduled-workload fallback"
            );
            return fallback_signal >= self.thresholds.fallback;
        }

        if let Some(qps) = self.reading("request_rate", QPS_QUERY).await {
            if qps > self.thresholds.qps {
                info!(
                    qps,
                    threshold = self.thresholds.qps,
                    "spike detected: request rate over threshold"
                );
                return true;
            }
        }

        if let Some(error_rate) = self.reading("error_rate", ERROR_RATE_QUERY).await {
            if error_rate > self.thresholds.error_rate {
                info!(
                    error_rate,
                    threshold = self.thresholds.error_rate,
                    "spike detected: server-error rate over threshold"
                );
                return true;
            }
        }

        if let Some(p95_ms) = self.reading("p95_latency", P95_LATENCY_QUERY).await {
            if p95_ms > self.thresholds.p95_latency_ms {
                info!(
                    p95_ms,
                    threshold = self.thresholds.p95_latency_ms,
                    "spike detected: p95 latency over threshold"
                );
                return true;
            }
        }

        if let Some(replica_increase) = self.reading("hpa_replicas", HPA_SCALE_UP_QUERY).await {
            if replica_increase > 0.0 {
                info!(replica_increase, "spike detected: autoscaler scale-up observed");
                return true;
            }
        }

        false
    }

    async fn reading(&self, signal: &str, expr: &str) -> Option<f64> {
        match self.source.query_scalar(expr).await {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(signal, %error, "telemetry query failed");
                None
            }
        }
    }
}
