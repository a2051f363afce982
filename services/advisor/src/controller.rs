//! Controller.
//!
//! Owns the DORMANT/ACTIVE state machine and the two periodic timers that
//! drive it: a spike poller that triggers gang formation and a cooldown
//! checker that tears everything down once the spike window closes. While
//! dormant the advisor does no work beyond the poll itself.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::gang::{GangManager, GangStage};
use crate::graph::DependencyGraph;
use crate::inventory::Inventory;
use crate::metrics::{elapsed_ms, Metrics};
use crate::spike::SpikeDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvisorState {
    Dormant,
    Active,
}

impl AdvisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvisorState::Dormant => "DORMANT",
            AdvisorState::Active => "ACTIVE",
        }
    }
}

pub struct Controller {
    detector: SpikeDetector,
    graph: Arc<DependencyGraph>,
    gangs: Arc<GangManager>,
    inventory: Arc<dyn Inventory>,
    metrics: Arc<Metrics>,
    cooldown: Duration,
    state: RwLock<AdvisorState>,
    last_spike_at: RwLock<Option<DateTime<Utc>>>,
}

impl Controller {
    pub fn new(
        detector: SpikeDetector,
        graph: Arc<DependencyGraph>,
        gangs: Arc<GangManager>,
        inventory: Arc<dyn Inventory>,
        metrics: Arc<Metrics>,
        cooldown: Duration,
    ) -> Self {
        Self {
            detector,
            graph,
            gangs,
            inventory,
            metrics,
            cooldown,
            state: RwLock::new(AdvisorState::Dormant),
            last_spike_at: RwLock::new(None),
        }
    }

    pub fn state(&self) -> AdvisorState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn last_spike_at(&self) -> Option<DateTime<Utc>> {
        *self
            .last_spike_at
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: AdvisorState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state == next {
            return;
        }
        info!(from = state.as_str(), to = next.as_str(), "state change");
        *state = next;
        self.metrics.state_changes_total.inc();
        self.metrics
            .state
            .set(matches!(next, AdvisorState::Active) as i64);
    }

    fn touch_spike(&self) {
        *self
            .last_spike_at
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }

    /// Number of workloads awaiting placement, used as the detector's fallback
    /// signal when telemetry is unreachable.
    async fn unscheduled_count(&self) -> i64 {
        match self.inventory.list_workloads().await {
            Ok(workloads) => workloads.iter().filter(|w| w.is_unscheduled()).count() as i64,
            Err(error) => {
                debug!(%error, "could not count unscheduled workloads");
                0
            }
        }
    }

    /// One spike-poller tick. Public so tests can drive activation directly.
    pub async fn poll_once(&self) {
        if self.state() != AdvisorState::Dormant {
            return;
        }

        let fallback = self.unscheduled_count().await;
        if self.detector.detect(fallback).await {
            self.metrics.spike_events_total.inc();
            self.activate().await;
        }
    }

    /// Drive the activation chain: build the graph, form gangs, go ACTIVE.
    ///
    /// A failed graph build aborts the attempt and leaves the advisor
    /// dormant; the next poll tick retries.
    async fn activate(&self) {
        let started = Instant::now();
        self.gangs.set_stage(GangStage::SpikeDetected);

        if let Err(error) = self.graph.build().await {
            error!(%error, "dependency graph build failed, aborting activation");
            self.metrics.activation_failures_total.inc();
            self.gangs.set_stage(GangStage::None);
            return;
        }
        self.gangs.set_stage(GangStage::GraphBuilt);

        self.gangs.form(&self.graph.groups());
        self.gangs.set_stage(GangStage::Scheduling);

        self.touch_spike();
        self.set_state(AdvisorState::Active);
        self.metrics.activation_latency_ms.observe(elapsed_ms(started));
        info!(gangs = self.gangs.active_count(), "advisor activated");
    }

    /// One cooldown-checker tick. Public so tests can drive dissolution.
    pub async fn check_cooldown_once(&self) {
        if self.state() != AdvisorState::Active {
            return;
        }
        let Some(last_spike) = self.last_spike_at() else {
            return;
        };

        let quiet = Utc::now()
            .signed_duration_since(last_spike)
            .to_std()
            .unwrap_or_default();
        if quiet <= self.cooldown {
            return;
        }

        let fallback = self.unscheduled_count().await;
        if self.detector.detect(fallback).await {
            debug!("spike still in progress, extending window");
            self.touch_spike();
            return;
        }

        self.deactivate();
    }

    fn deactivate(&self) {
        self.gangs.set_stage(GangStage::Cooldown);
        self.gangs.dissolve_all();
        self.graph.clear();
        self.gangs.set_stage(GangStage::None);
        self.set_state(AdvisorState::Dormant);
        info!("cooldown complete, advisor dormant");
    }

    /// Run the spike poller until shutdown is signaled.
    pub async fn run_spike_poller(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(period_secs = period.as_secs(), "starting spike poller");
        let mut interval = tokio::time::interval(period);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => self.poll_once().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("spike poller shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run the cooldown checker until shutdown is signaled.
    pub async fn run_cooldown_checker(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(period_secs = period.as_secs(), "starting cooldown checker");
        let mut interval = tokio::time::interval(period);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => self.check_cooldown_once().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("cooldown checker shutting down");
                        break;
                    }
                }
            }
        }
    }
}
