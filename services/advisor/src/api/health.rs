//! Operator endpoints: health probes, the state snapshot, and metrics.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::controller::AdvisorState;
use crate::gang::GangStage;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    timestamp: String,
}

/// Snapshot of the advisor's observable state.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: AdvisorState,
    pub gang_stage: GangStage,
    pub active_gang_count: usize,
    pub graph_built: bool,
    pub last_spike_at: Option<DateTime<Utc>>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(healthz))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
}

/// Liveness and readiness are the same check: the advisor has no hard
/// dependency, so responsive means ready. A missing advisor reads as "no
/// opinion" to the primary scheduler either way.
async fn healthz() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        service: "surge-advisor",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        state: state.controller().state(),
        gang_stage: state.gangs().stage(),
        active_gang_count: state.gangs().active_count(),
        graph_built: state.graph().built(),
        last_spike_at: state.controller().last_spike_at(),
    })
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics().render(),
    )
}
