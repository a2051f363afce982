//! Metrics registry.
//!
//! An explicit registry constructed at startup and threaded through the
//! application state, rendered in the line-oriented exposition format at
//! `/metrics`.

use std::time::Instant;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

/// Latency bucket boundaries shared by all histograms, in milliseconds.
const LATENCY_BUCKETS_MS: &[f64] = &[
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0,
];

pub struct Metrics {
    registry: Registry,

    /// Time from spike detection to the ACTIVE state.
    pub activation_latency_ms: Histogram,
    /// Time to build the dependency graph and form gangs.
    pub gang_formation_latency_ms: Histogram,
    /// Overhead added to the primary scheduler's filter phase.
    pub advisor_filter_latency_ms: Histogram,
    /// Overhead added to the primary scheduler's prioritize phase.
    pub advisor_prioritize_latency_ms: Histogram,

    /// Current state: 0=DORMANT, 1=ACTIVE.
    pub state: IntGauge,

    pub spike_events_total: IntCounter,
    pub gangs_formed_total: IntCounter,
    pub gangs_dissolved_total: IntCounter,
    pub filter_calls_total: IntCounter,
    pub prioritize_calls_total: IntCounter,
    pub state_changes_total: IntCounter,
    pub activation_failures_total: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let latency_histogram = |name: &str, help: &str| -> prometheus::Result<Histogram> {
            Histogram::with_opts(
                HistogramOpts::new(name, help).buckets(LATENCY_BUCKETS_MS.to_vec()),
            )
        };

        let activation_latency_ms = latency_histogram(
            "activation_latency_ms",
            "Time from spike detection to ACTIVE state (ms)",
        )?;
        let gang_formation_latency_ms = latency_histogram(
            "gang_formation_latency_ms",
            "Time to build the dependency graph and form gangs (ms)",
        )?;
        let advisor_filter_latency_ms = latency_histogram(
            "advisor_filter_latency_ms",
            "Overhead added to the scheduler filter phase (ms)",
        )?;
        let advisor_prioritize_latency_ms = latency_histogram(
            "advisor_prioritize_latency_ms",
            "Overhead added to the scheduler prioritize phase (ms)",
        )?;

        let state = IntGauge::new("state", "Current advisor state (0=DORMANT, 1=ACTIVE)")?;

        let spike_events_total =
            IntCounter::new("spike_events_total", "Total spike events detected")?;
        let gangs_formed_total = IntCounter::new("gangs_formed_total", "Total gangs formed")?;
        let gangs_dissolved_total =
            IntCounter::new("gangs_dissolved_total", "Total gangs dissolved")?;
        let filter_calls_total =
            IntCounter::new("filter_calls_total", "Total filter endpoint calls")?;
        let prioritize_calls_total = IntCounter::new(
            "prioritize_calls_total",
            "Total prioritize endpoint calls",
        )?;
        let state_changes_total = IntCounter::new(
            "state_changes_total",
            "Total DORMANT/ACTIVE state transitions",
        )?;
        let activation_failures_total = IntCounter::new(
            "activation_failures_total",
            "Activation attempts aborted by a failed graph build",
        )?;

        registry.register(Box::new(activation_latency_ms.clone()))?;
        registry.register(Box::new(gang_formation_latency_ms.clone()))?;
        registry.register(Box::new(advisor_filter_latency_ms.clone()))?;
        registry.register(Box::new(advisor_prioritize_latency_ms.clone()))?;
        registry.register(Box::new(state.clone()))?;
        registry.register(Box::new(spike_events_total.clone()))?;
        registry.register(Box::new(gangs_formed_total.clone()))?;
        registry.register(Box::new(gangs_dissolved_total.clone()))?;
        registry.register(Box::new(filter_calls_total.clone()))?;
        registry.register(Box::new(prioritize_calls_total.clone()))?;
        registry.register(Box::new(state_changes_total.clone()))?;
        registry.register(Box::new(activation_failures_total.clone()))?;

        Ok(Self {
            registry,
            activation_latency_ms,
            gang_formation_latency_ms,
            advisor_filter_latency_ms,
            advisor_prioritize_latency_ms,
            state,
            spike_events_total,
            gangs_formed_total,
            gangs_dissolved_total,
            filter_calls_total,
            prioritize_calls_total,
            state_changes_total,
            activation_failures_total,
        })
    }

    /// Render every metric in the exposition text format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(error) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::error!(%error, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Milliseconds elapsed since `started`.
pub fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_metric_families() {
        let metrics = Metrics::new().unwrap();
        metrics.spike_events_total.inc();
        metrics.state.set(1);
        metrics.advisor_filter_latency_ms.observe(3.2);

        let text = metrics.render();
        assert!(text.contains("spike_events_total 1"));
        assert!(text.contains("state 1"));
        assert!(text.contains("advisor_filter_latency_ms_bucket{le=\"5\"} 1"));
        assert!(text.contains("advisor_filter_latency_ms_bucket{le=\"+Inf\"} 1"));
        assert!(text.contains("gangs_formed_total 0"));
        assert!(text.contains("gangs_dissolved_total 0"));
        assert!(text.contains("filter_calls_total 0"));
        assert!(text.contains("prioritize_calls_total 0"));
        assert!(text.contains("state_changes_total 0"));
        assert!(text.contains("activation_latency_ms_count 0"));
        assert!(text.contains("gang_formation_latency_ms_count 0"));
        assert!(text.contains("advisor_prioritize_latency_ms_count 0"));
    }
}
