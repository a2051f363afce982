//! Gang lifecycle manager.
//!
//! Gangs are ephemeral: formed in one batch on spike activation, read-only
//! afterwards except for placement counts, and dissolved atomically when the
//! spike window closes. A service identifier belongs to at most one active
//! gang at a time.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use surge_extender_api::Workload;

use crate::graph::CoordinationGroup;
use crate::metrics::{elapsed_ms, Metrics};
use crate::service::ServiceCatalog;

/// Lifecycle stage, tracked for observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GangStage {
    #[default]
    None,
    SpikeDetected,
    GraphBuilt,
    Formed,
    Scheduling,
    Cooldown,
    Dissolved,
}

impl GangStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            GangStage::None => "NONE",
            GangStage::SpikeDetected => "SPIKE_DETECTED",
            GangStage::GraphBuilt => "GRAPH_BUILT",
            GangStage::Formed => "FORMED",
            GangStage::Scheduling => "SCHEDULING",
            GangStage::Cooldown => "COOLDOWN",
            GangStage::Dissolved => "DISSOLVED",
        }
    }
}

impl fmt::Display for GangStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The runtime realization of a coordination group during a spike.
#[derive(Debug, Clone)]
pub struct Gang {
    pub id: String,
    pub members: Vec<String>,
    /// Host identifier → count of gang members observed placed there.
    pub node_prefs: HashMap<String, u32>,
    pub created_at: DateTime<Utc>,
    pub stage: GangStage,
}

impl Gang {
    pub fn has_member(&self, service_id: &str) -> bool {
        self.members
            .iter()
            .any(|member| member.eq_ignore_ascii_case(service_id))
    }
}

#[derive(Default)]
struct GangInner {
    gangs: HashMap<String, Gang>,
    service_index: HashMap<String, String>,
    stage: GangStage,
}

pub struct GangManager {
    catalog: Arc<ServiceCatalog>,
    metrics: Arc<Metrics>,
    seq: AtomicU64,
    inner: RwLock<GangInner>,
}

impl GangManager {
    pub fn new(catalog: Arc<ServiceCatalog>, metrics: Arc<Metrics>) -> Self {
        Self {
            catalog,
            metrics,
            seq: AtomicU64::new(0),
            inner: RwLock::new(GangInner::default()),
        }
    }

    /// Atomically replace any existing gangs with one gang per input group.
    ///
    /// A service already claimed by an earlier gang in the batch is skipped
    /// so the service→gang index stays a partial function.
    pub fn form(&self, groups: &[CoordinationGroup]) {
        let started = Instant::now();
        let formed = {
            let mut inner = self.write();
            inner.gangs.clear();
            inner.service_index.clear();

            for group in groups {
                let id = format!(
                    "gang-{}-{}",
                    group.name,
                    self.seq.fetch_add(1, Ordering::Relaxed)
                );

                let mut members = Vec::with_capacity(group.services.len());
                for service in &group.services {
                    if inner.service_index.contains_key(service) {
                        warn!(
                            service,
                            gang = %id,
                            "service already claimed by another gang, skipping"
                        );
                        continue;
                    }
                    inner.service_index.insert(service.clone(), id.clone());
                    members.push(service.clone());
                }

                if members.is_empty() {
                    warn!(group = %group.name, "group has no unclaimed members, skipping gang");
                    continue;
                }

                info!(gang = %id, members = ?members, "gang formed");
                inner.gangs.insert(
                    id.clone(),
                    Gang {
                        id,
                        members,
                        node_prefs: HashMap::new(),
                        created_at: Utc::now(),
                        stage: GangStage::Formed,
                    },
                );
            }

            inner.stage = GangStage::Formed;
            inner.gangs.len()
        };

        self.metrics.gangs_formed_total.inc_by(formed as u64);
        let elapsed = elapsed_ms(started);
        self.metrics.gang_formation_latency_ms.observe(elapsed);
        info!(gangs = formed, elapsed_ms = elapsed, "gang formation complete");
    }

    /// Atomically dissolve all gangs and free their state. Safe when empty.
    pub fn dissolve_all(&self) {
        let dissolved = {
            let mut inner = self.write();
            let dissolved = inner.gangs.len();
            if dissolved == 0 {
                return;
            }
            inner.gangs.clear();
            inner.service_index.clear();
            inner.stage = GangStage::Dissolved;
            dissolved
        };

        self.metrics.gangs_dissolved_total.inc_by(dissolved as u64);
        info!(gangs = dissolved, "gangs dissolved, in-memory state freed");
    }

    pub fn gang_for(&self, service_id: &str) -> Option<Gang> {
        let inner = self.read();
        inner
            .service_index
            .get(service_id)
            .and_then(|gang_id| inner.gangs.get(gang_id))
            .cloned()
    }

    pub fn gang_for_workload(&self, workload: &Workload) -> Option<Gang> {
        self.gang_for(&self.catalog.service_id(workload.name()))
    }

    pub fn members_for(&self, workload: &Workload) -> Vec<String> {
        self.gang_for_workload(workload)
            .map(|gang| gang.members)
            .unwrap_or_default()
    }

    /// Record that a gang member was (probably) placed on a host. Called
    /// opportunistically; counts need not be exact.
    pub fn note_placement(&self, service_id: &str, host_id: &str) {
        let mut inner = self.write();
        let Some(gang_id) = inner.service_index.get(service_id).cloned() else {
            return;
        };
        if let Some(gang) = inner.gangs.get_mut(&gang_id) {
            let count = gang.node_prefs.entry(host_id.to_string()).or_insert(0);
            *count += 1;
            debug!(
                gang = %gang_id,
                service = service_id,
                host = host_id,
                count = *count,
                "recorded placement preference"
            );
        }
    }

    pub fn active_count(&self) -> usize {
        self.read().gangs.len()
    }

    pub fn stage(&self) -> GangStage {
        self.read().stage
    }

    pub fn set_stage(&self, stage: GangStage) {
        let mut inner = self.write();
        debug!(from = %inner.stage, to = %stage, "gang lifecycle stage");
        inner.stage = stage;
    }

    fn read(&self) -> RwLockReadGuard<'_, GangInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GangInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn group(name: &str, services: &[&str]) -> CoordinationGroup {
        CoordinationGroup {
            name: name.to_string(),
            services: services.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    fn manager() -> GangManager {
        GangManager::new(
            Arc::new(ServiceCatalog::with_defaults()),
            Arc::new(Metrics::new().unwrap()),
        )
    }

    fn workload(name: &str) -> Workload {
        serde_json::from_value(serde_json::json!({"metadata": {"name": name}})).unwrap()
    }

    #[test]
    fn form_indexes_every_member() {
        let manager = manager();
        manager.form(&[group("checkout-flow", &["cartservice", "paymentservice"])]);

        assert_eq!(manager.active_count(), 1);
        assert_eq!(manager.stage(), GangStage::Formed);

        let gang = manager.gang_for("cartservice").unwrap();
        assert!(gang.id.starts_with("gang-checkout-flow-"));
        assert!(gang.has_member("paymentservice"));
        assert!(gang.created_at <= Utc::now());

        let by_workload = manager.gang_for_workload(&workload("cartservice-5f8d-1")).unwrap();
        assert_eq!(by_workload.id, gang.id);
        assert_eq!(
            manager.members_for(&workload("cartservice-5f8d-1")),
            vec!["cartservice".to_string(), "paymentservice".to_string()]
        );
    }

    #[test]
    fn a_service_joins_at_most_one_gang() {
        let manager = manager();
        manager.form(&[
            group("checkout-flow", &["cartservice", "paymentservice"]),
            group("payments", &["paymentservice", "emailservice"]),
        ]);

        let first = manager.gang_for("paymentservice").unwrap();
        assert!(first.id.starts_with("gang-checkout-flow-"));

        let second = manager.gang_for("emailservice").unwrap();
        assert!(second.id.starts_with("gang-payments-"));
        assert!(!second.has_member("paymentservice"));
    }

    #[test]
    fn form_replaces_previous_gangs() {
        let manager = manager();
        manager.form(&[group("checkout-flow", &["cartservice"])]);
        manager.form(&[group("product-browsing", &["frontend"])]);

        assert_eq!(manager.active_count(), 1);
        assert!(manager.gang_for("cartservice").is_none());
        assert!(manager.gang_for("frontend").is_some());
    }

    #[test]
    fn gang_ids_are_unique_across_formations() {
        let manager = manager();
        manager.form(&[group("checkout-flow", &["cartservice"])]);
        let first = manager.gang_for("cartservice").unwrap().id;
        manager.form(&[group("checkout-flow", &["cartservice"])]);
        let second = manager.gang_for("cartservice").unwrap().id;
        assert_ne!(first, second);
    }

    #[test]
    fn dissolve_all_empties_everything() {
        let manager = manager();
        manager.form(&[
            group("checkout-flow", &["cartservice"]),
            group("product-browsing", &["frontend"]),
        ]);
        manager.dissolve_all();

        assert_eq!(manager.active_count(), 0);
        assert!(manager.gang_for("cartservice").is_none());
        assert!(manager.gang_for("frontend").is_none());
        assert_eq!(manager.stage(), GangStage::Dissolved);
    }

    #[test]
    fn dissolve_all_is_safe_when_empty() {
        let manager = manager();
        manager.dissolve_all();
        manager.dissolve_all();
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn formation_and_dissolution_count_gangs() {
        let manager = manager();
        manager.form(&[
            group("checkout-flow", &["cartservice"]),
            group("product-browsing", &["frontend"]),
        ]);
        assert_eq!(manager.metrics.gangs_formed_total.get(), 2);

        manager.dissolve_all();
        assert_eq!(manager.metrics.gangs_dissolved_total.get(), 2);
    }

    #[test]
    fn note_placement_increments_node_prefs() {
        let manager = manager();
        manager.form(&[group("checkout-flow", &["cartservice", "paymentservice"])]);

        manager.note_placement("cartservice", "h2");
        manager.note_placement("paymentservice", "h2");
        manager.note_placement("unknown-service", "h2");

        let gang = manager.gang_for("cartservice").unwrap();
        assert_eq!(gang.node_prefs.get("h2"), Some(&2));
    }
}
