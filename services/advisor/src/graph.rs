//! Dependency graph builder.
//!
//! Scans workload annotations at activation time and produces coordination
//! groups. The graph exists in memory only for the life of a spike; rebuilds
//! start from scratch and teardown clears everything.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, warn};

use surge_extender_api::Workload;

use crate::inventory::{Inventory, InventoryError};
use crate::service::ServiceCatalog;

/// Annotation naming the coordination group a workload belongs to.
pub const SERVICE_GROUP_ANNOTATION: &str = "surge.io/service-group";
/// Annotation listing comma-separated dependency service identifiers.
pub const DEPENDS_ON_ANNOTATION: &str = "surge.io/depends-on";

/// A named set of service identifiers believed to be dependency-coupled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinationGroup {
    pub name: String,
    pub services: BTreeSet<String>,
}

#[derive(Default)]
struct GraphInner {
    groups: Vec<CoordinationGroup>,
    built: bool,
}

pub struct DependencyGraph {
    inventory: Arc<dyn Inventory>,
    catalog: Arc<ServiceCatalog>,
    builtin_groups: bool,
    inner: RwLock<GraphInner>,
}

impl DependencyGraph {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        catalog: Arc<ServiceCatalog>,
        builtin_groups: bool,
    ) -> Self {
        Self {
            inventory,
            catalog,
            builtin_groups,
            inner: RwLock::new(GraphInner::default()),
        }
    }

    /// Rebuild the graph from workload annotations.
    ///
    /// A list failure propagates to the caller; the previous graph (if any)
    /// is left untouched so a failed rebuild cannot partially clear state.
    pub async fn build(&self) -> Result<(), InventoryError> {
        let workloads = self.inventory.list_workloads().await?;
        let mut groups = groups_from_annotations(&self.catalog, &workloads);

        if groups.is_empty() && self.builtin_groups {
            info!("no annotated workloads found, loading built-in demonstration groups");
            groups = builtin_demo_groups();
        }

        for group in &groups {
            info!(group = %group.name, services = ?group.services, "discovered coordination group");
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.built = true;
        inner.groups = groups;
        info!(groups = inner.groups.len(), "dependency graph built");
        Ok(())
    }

    pub fn groups(&self) -> Vec<CoordinationGroup> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .groups
            .clone()
    }

    pub fn built(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .built
    }

    /// Free all in-memory graph data. Idempotent.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.built && inner.groups.is_empty() {
            return;
        }
        *inner = GraphInner::default();
        info!("dependency graph cleared");
    }
}

fn groups_from_annotations(
    catalog: &ServiceCatalog,
    workloads: &[Workload],
) -> Vec<CoordinationGroup> {
    let mut by_name: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for workload in workloads {
        let Some(group_name) = workload.annotation(SERVICE_GROUP_ANNOTATION) else {
            continue;
        };
        if group_name.is_empty() {
            warn!(workload = workload.name(), "empty service-group annotation");
            continue;
        }

        let services = by_name.entry(group_name.to_string()).or_default();
        services.insert(catalog.service_id(workload.name()));

        if let Some(depends_on) = workload.annotation(DEPENDS_ON_ANNOTATION) {
            for dependency in depends_on.split(',') {
                let dependency = dependency.trim();
                if !dependency.is_empty() {
                    services.insert(dependency.to_string());
                }
            }
        }
    }

    by_name
        .into_iter()
        .map(|(name, services)| CoordinationGroup { name, services })
        .collect()
}

/// Well-known groups for demonstration workloads, used only when no
/// annotated workloads exist.
fn builtin_demo_groups() -> Vec<CoordinationGroup> {
    let group = |name: &str, services: &[&str]| CoordinationGroup {
        name: name.to_string(),
        services: services.iter().map(|s| s.to_string()).collect(),
    };

    vec![
        group(
            "checkout-flow",
            &[
                "cartservice",
                "paymentservice",
                "checkoutservice",
                "currencyservice",
            ],
        ),
        group(
            "product-browsing",
            &["frontend", "productcatalogservice", "recommendationservice"],
        ),
    ]
}
