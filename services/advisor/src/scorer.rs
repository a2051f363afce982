//! Node scoring.
//!
//! Score = locality + resources. Locality counts gang members already
//! running on the host at 100 points each; the resource bonus is capped at
//! 150, so one co-located peer always outweighs any amount of free capacity.

use std::sync::Arc;

use tracing::warn;

use surge_extender_api::{Host, HostPriority};

use crate::gang::Gang;
use crate::inventory::Inventory;
use crate::service::ServiceCatalog;

pub const LOCALITY_WEIGHT: i64 = 100;
const CPU_SCORE_CAP: i64 = 100;
const MEMORY_SCORE_CAP: i64 = 50;

pub struct NodeScorer {
    inventory: Arc<dyn Inventory>,
    catalog: Arc<ServiceCatalog>,
}

impl NodeScorer {
    pub fn new(inventory: Arc<dyn Inventory>, catalog: Arc<ServiceCatalog>) -> Self {
        Self { inventory, catalog }
    }

    /// Score every candidate host for a workload belonging to `gang`.
    pub async fn score(&self, hosts: &[Host], gang: &Gang) -> Vec<HostPriority> {
        let mut priorities = Vec::with_capacity(hosts.len());
        for host in hosts {
            let locality =
                self.count_members_on(host.name(), gang).await as i64 * LOCALITY_WEIGHT;
            let score = locality + resource_score(host);
            priorities.push(HostPriority {
                host: host.name().to_string(),
                score,
            });
        }
        priorities
    }

    /// Count gang members currently running on a host.
    ///
    /// An inventory failure degrades the count to zero; scoring stays valid.
    pub async fn count_members_on(&self, host: &str, gang: &Gang) -> usize {
        if gang.members.is_empty() {
            return 0;
        }

        let workloads = match self.inventory.list_workloads_on(host).await {
            Ok(workloads) => workloads,
            Err(error) => {
                warn!(host, %error, "failed to list workloads on host");
                return 0;
            }
        };

        workloads
            .iter()
            .filter(|workload| gang.has_member(&self.catalog.service_id(workload.name())))
            .count()
    }
}

/// Resource bonus from allocatable capacity: 10 points per 100 millicores
/// (capped at 100) plus 1 point per 100 MiB (capped at 50).
fn resource_score(host: &Host) -> i64 {
    let cpu = (host.allocatable_cpu_millis() / 100 * 10).min(CPU_SCORE_CAP);
    let memory = (host.allocatable_memory_bytes() / (100 * 1024 * 1024)).min(MEMORY_SCORE_CAP);
    cpu + memory
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gang::GangStage;
    use crate::inventory::InventoryError;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use surge_extender_api::Workload;

    #[derive(Default)]
    struct PlacementFixture {
        by_host: HashMap<String, Vec<String>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Inventory for PlacementFixture {
        async fn list_workloads(&self) -> Result<Vec<Workload>, InventoryError> {
            Ok(Vec::new())
        }

        async fn list_workloads_on(&self, host: &str) -> Result<Vec<Workload>, InventoryError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(InventoryError::ListFailed("fixture outage".into()));
            }
            let names = self.by_host.get(host).cloned().unwrap_or_default();
            Ok(names
                .into_iter()
                .map(|name| {
                    serde_json::from_value(json!({"metadata": {"name": name}})).unwrap()
                })
                .collect())
        }

        async fn list_hosts(&self) -> Result<Vec<Host>, InventoryError> {
            Ok(Vec::new())
        }
    }

    fn gang(members: &[&str]) -> Gang {
        Gang {
            id: "gang-checkout-flow-0".to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            node_prefs: HashMap::new(),
            created_at: Utc::now(),
            stage: GangStage::Formed,
        }
    }

    fn host(name: &str, cpu: &str, memory: &str) -> Host {
        serde_json::from_value(json!({
            "metadata": {"name": name},
            "status": {
                "conditions": [{"type": "Ready", "status": "True"}],
                "allocatable": {"cpu": cpu, "memory": memory}
            }
        }))
        .unwrap()
    }

    fn scorer(fixture: PlacementFixture) -> NodeScorer {
        NodeScorer::new(Arc::new(fixture), Arc::new(ServiceCatalog::with_defaults()))
    }

    #[test]
    fn resource_bonus_is_capped() {
        // 64 cores / 256 GiB: both components pinned to their caps.
        let big = host("big", "64", "256Gi");
        assert_eq!(resource_score(&big), CPU_SCORE_CAP + MEMORY_SCORE_CAP);

        // 500m / 300Mi: 5*10 cpu points, 3 memory points.
        let small = host("small", "500m", "300Mi");
        assert_eq!(resource_score(&small), 53);

        let bare: Host = serde_json::from_value(json!({"metadata": {"name": "bare"}})).unwrap();
        assert_eq!(resource_score(&bare), 0);
    }

    #[tokio::test]
    async fn locality_counts_gang_members_case_insensitively() {
        let fixture = PlacementFixture {
            by_host: HashMap::from([(
                "h2".to_string(),
                vec![
                    "paymentservice-abc-1".to_string(),
                    "CartService-def-2".to_string(),
                    "frontend-xyz-3".to_string(),
                ],
            )]),
            ..Default::default()
        };
        let scorer = scorer(fixture);
        let gang = gang(&["cartservice", "paymentservice", "checkoutservice"]);

        assert_eq!(scorer.count_members_on("h2", &gang).await, 2);
        assert_eq!(scorer.count_members_on("h1", &gang).await, 0);
    }

    #[tokio::test]
    async fn colocated_peer_outweighs_resource_bonus() {
        let fixture = PlacementFixture {
            by_host: HashMap::from([(
                "h2".to_string(),
                vec!["paymentservice-abc-1".to_string()],
            )]),
            ..Default::default()
        };
        let scorer = scorer(fixture);
        let gang = gang(&["cartservice", "paymentservice"]);

        // h1 is far larger, h2 holds one peer on a tiny node.
        let hosts = vec![host("h1", "64", "256Gi"), host("h2", "500m", "300Mi")];
        let priorities = scorer.score(&hosts, &gang).await;

        let by_name: HashMap<_, _> = priorities
            .iter()
            .map(|p| (p.host.as_str(), p.score))
            .collect();
        assert_eq!(by_name["h1"], 150);
        assert_eq!(by_name["h2"], 153);
        assert!(by_name["h2"] > by_name["h1"]);
    }

    #[tokio::test]
    async fn inventory_failure_degrades_locality_to_zero() {
        let fixture = PlacementFixture {
            fail: AtomicBool::new(true),
            ..Default::default()
        };
        let scorer = scorer(fixture);
        let gang = gang(&["cartservice"]);

        assert_eq!(scorer.count_members_on("h1", &gang).await, 0);
        let priorities = scorer.score(&[host("h1", "4", "8Gi")], &gang).await;
        assert_eq!(priorities[0].score, resource_score(&host("h1", "4", "8Gi")));
    }

    #[tokio::test]
    async fn empty_gang_scores_resources_only() {
        let scorer = scorer(PlacementFixture::default());
        let gang = gang(&[]);
        assert_eq!(scorer.count_members_on("h1", &gang).await, 0);
    }
}
