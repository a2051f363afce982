//! Application state shared across request handlers.

use std::sync::Arc;

use crate::controller::Controller;
use crate::gang::GangManager;
use crate::graph::DependencyGraph;
use crate::inventory::Inventory;
use crate::metrics::Metrics;
use crate::scorer::NodeScorer;
use crate::service::ServiceCatalog;

/// Shared application state, passed to all request handlers via Axum's
/// state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    controller: Arc<Controller>,
    gangs: Arc<GangManager>,
    graph: Arc<DependencyGraph>,
    scorer: Arc<NodeScorer>,
    inventory: Arc<dyn Inventory>,
    catalog: Arc<ServiceCatalog>,
    metrics: Arc<Metrics>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        controller: Arc<Controller>,
        gangs: Arc<GangManager>,
        graph: Arc<DependencyGraph>,
        scorer: Arc<NodeScorer>,
        inventory: Arc<dyn Inventory>,
        catalog: Arc<ServiceCatalog>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                controller,
                gangs,
                graph,
                scorer,
                inventory,
                catalog,
                metrics,
            }),
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.inner.controller
    }

    pub fn gangs(&self) -> &GangManager {
        &self.inner.gangs
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.inner.graph
    }

    pub fn scorer(&self) -> &NodeScorer {
        &self.inner.scorer
    }

    pub fn inventory(&self) -> &dyn Inventory {
        self.inner.inventory.as_ref()
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.inner.catalog
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }
}
