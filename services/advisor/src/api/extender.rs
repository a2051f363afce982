//! Scheduler-extender endpoints.
//!
//! The primary scheduler calls `/filter` and `/prioritize` during placement.
//! While dormant, or for workloads outside any gang, both endpoints return
//! "no opinion": the candidate list unchanged, or all-zero scores. The
//! filter prefers but never strands: it drops unschedulable hosts only
//! when some candidate already runs a gang peer, and never empties the list.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use surge_extender_api::{ExtenderArgs, FilterResult, Host, HostList, HostPriority};

use crate::controller::AdvisorState;
use crate::metrics::elapsed_ms;
use crate::state::AppState;

pub const NODE_NOT_SCHEDULABLE: &str = "Node not schedulable";

pub(super) async fn filter(
    State(state): State<AppState>,
    payload: Result<Json<ExtenderArgs>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    state.metrics().filter_calls_total.inc();

    let response = match payload {
        Ok(Json(args)) => Json(filter_result(&state, &args).await).into_response(),
        Err(rejection) => {
            let result = FilterResult {
                error: Some(rejection.body_text()),
                ..Default::default()
            };
            (StatusCode::BAD_REQUEST, Json(result)).into_response()
        }
    };

    state
        .metrics()
        .advisor_filter_latency_ms
        .observe(elapsed_ms(started));
    response
}

pub(super) async fn prioritize(
    State(state): State<AppState>,
    payload: Result<Json<ExtenderArgs>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    state.metrics().prioritize_calls_total.inc();

    let response = match payload {
        Ok(Json(args)) => Json(prioritize_result(&state, &args).await).into_response(),
        Err(rejection) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": rejection.body_text()})),
        )
            .into_response(),
    };

    state
        .metrics()
        .advisor_prioritize_latency_ms
        .observe(elapsed_ms(started));
    response
}

async fn filter_result(state: &AppState, args: &ExtenderArgs) -> FilterResult {
    if state.controller().state() == AdvisorState::Dormant {
        return passthrough(args);
    }
    let Some(gang) = state.gangs().gang_for_workload(&args.pod) else {
        return passthrough(args);
    };

    let Some(hosts) = resolve_hosts(state, args).await else {
        return passthrough(args);
    };

    // Hosts are only dropped when at least one candidate already runs a
    // gang peer; a fresh gang sees the full list.
    let mut peer_host_exists = false;
    for host in &hosts {
        if state.scorer().count_members_on(host.name(), &gang).await > 0 {
            peer_host_exists = true;
            break;
        }
    }
    if !peer_host_exists {
        return passthrough(args);
    }

    let mut kept = Vec::with_capacity(hosts.len());
    let mut failed_nodes = BTreeMap::new();
    for host in &hosts {
        if host.is_schedulable() {
            kept.push(host.clone());
        } else {
            failed_nodes.insert(host.name().to_string(), NODE_NOT_SCHEDULABLE.to_string());
        }
    }

    if kept.is_empty() {
        // Dropping every candidate would leave the scheduler nothing to
        // bind; no opinion instead.
        return passthrough(args);
    }

    shape_result(args, kept, failed_nodes)
}

async fn prioritize_result(state: &AppState, args: &ExtenderArgs) -> Vec<HostPriority> {
    let zeros = || {
        candidate_names(args)
            .into_iter()
            .map(|host| HostPriority { host, score: 0 })
            .collect::<Vec<_>>()
    };

    if state.controller().state() == AdvisorState::Dormant {
        return zeros();
    }
    let Some(gang) = state.gangs().gang_for_workload(&args.pod) else {
        return zeros();
    };

    let Some(hosts) = resolve_hosts(state, args).await else {
        return zeros();
    };

    let priorities = state.scorer().score(&hosts, &gang).await;

    // Opportunistic placement hint for the host we just biased toward.
    if let Some(top) = priorities.iter().max_by_key(|p| p.score) {
        if top.score > 0 {
            let service_id = state.catalog().service_id(args.pod.name());
            state.gangs().note_placement(&service_id, &top.host);
        }
    }

    priorities
}

/// Candidate hosts as full objects. Nodename-only requests are resolved
/// against the inventory; `None` means the candidates could not be resolved
/// and the caller should fall back to no opinion.
async fn resolve_hosts(state: &AppState, args: &ExtenderArgs) -> Option<Vec<Host>> {
    if let Some(nodes) = &args.nodes {
        return Some(nodes.items.clone());
    }

    let names = args.nodenames.as_deref()?;
    let all = match state.inventory().list_hosts().await {
        Ok(all) => all,
        Err(error) => {
            warn!(%error, "host resolution failed");
            return None;
        }
    };

    let mut hosts = Vec::with_capacity(names.len());
    for name in names {
        let host = all.iter().find(|host| host.name() == name)?;
        hosts.push(host.clone());
    }
    Some(hosts)
}

/// The input list, unchanged, in whichever form it arrived.
fn passthrough(args: &ExtenderArgs) -> FilterResult {
    FilterResult {
        nodes: args.nodes.clone(),
        nodenames: args.nodenames.clone(),
        ..Default::default()
    }
}

/// Mirror the request's candidate form in the response.
fn shape_result(
    args: &ExtenderArgs,
    kept: Vec<Host>,
    failed_nodes: BTreeMap<String, String>,
) -> FilterResult {
    if args.nodes.is_some() {
        FilterResult {
            nodes: Some(HostList { items: kept }),
            nodenames: None,
            failed_nodes,
            error: None,
        }
    } else {
        FilterResult {
            nodes: None,
            nodenames: Some(kept.iter().map(|host| host.name().to_string()).collect()),
            failed_nodes,
            error: None,
        }
    }
}

fn candidate_names(args: &ExtenderArgs) -> Vec<String> {
    if let Some(nodes) = &args.nodes {
        nodes
            .items
            .iter()
            .map(|host| host.name().to_string())
            .collect()
    } else {
        args.nodenames.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args_with_names(names: &[&str]) -> ExtenderArgs {
        serde_json::from_value(json!({
            "pod": {"metadata": {"name": "cartservice-abc-1"}},
            "nodenames": names
        }))
        .unwrap()
    }

    fn args_with_nodes(names: &[&str]) -> ExtenderArgs {
        let items: Vec<_> = names
            .iter()
            .map(|name| json!({"metadata": {"name": name}}))
            .collect();
        serde_json::from_value(json!({
            "pod": {"metadata": {"name": "cartservice-abc-1"}},
            "nodes": {"items": items}
        }))
        .unwrap()
    }

    #[test]
    fn passthrough_mirrors_request_shape() {
        let by_name = passthrough(&args_with_names(&["h1", "h2"]));
        assert_eq!(by_name.nodenames.unwrap(), vec!["h1", "h2"]);
        assert!(by_name.nodes.is_none());
        assert!(by_name.failed_nodes.is_empty());

        let by_object = passthrough(&args_with_nodes(&["h1"]));
        assert_eq!(by_object.nodes.unwrap().items.len(), 1);
        assert!(by_object.nodenames.is_none());
    }

    #[test]
    fn shape_result_returns_names_for_name_requests() {
        let args = args_with_names(&["h1", "h2"]);
        let kept = vec![serde_json::from_value(json!({"metadata": {"name": "h1"}})).unwrap()];
        let mut failed = BTreeMap::new();
        failed.insert("h2".to_string(), NODE_NOT_SCHEDULABLE.to_string());

        let result = shape_result(&args, kept, failed);
        assert_eq!(result.nodenames.unwrap(), vec!["h1"]);
        assert!(result.nodes.is_none());
        assert_eq!(result.failed_nodes["h2"], NODE_NOT_SCHEDULABLE);
    }

    #[test]
    fn candidate_names_reads_either_form() {
        assert_eq!(candidate_names(&args_with_names(&["h1", "h2"])), ["h1", "h2"]);
        assert_eq!(candidate_names(&args_with_nodes(&["h3"])), ["h3"]);
    }
}
