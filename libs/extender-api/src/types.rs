//! Advisory protocol and inventory object types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::quantity::{parse_cpu_millis, parse_memory_bytes};

/// Taint key the orchestrator places on cordoned hosts.
pub const UNSCHEDULABLE_TAINT: &str = "node.kubernetes.io/unschedulable";

/// Arguments the primary scheduler sends to `/filter` and `/prioritize`.
///
/// Candidates arrive either as full `Host` objects (`nodes`) or as bare
/// names (`nodenames`); responses mirror whichever form was used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtenderArgs {
    pub pod: Workload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<HostList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodenames: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostList {
    #[serde(default)]
    pub items: Vec<Host>,
}

/// Answer to a `/filter` call: the surviving candidates, plus a rejection
/// reason for every host that was dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<HostList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodenames: Option<Vec<String>>,
    #[serde(rename = "failedNodes", default)]
    pub failed_nodes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One `/prioritize` score. The scheduler ranks by score descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPriority {
    pub host: String,
    pub score: i64,
}

/// A workload (pod) as read from the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workload {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: WorkloadSpec,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Workload {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    /// True while the workload has no host assignment.
    pub fn is_unscheduled(&self) -> bool {
        self.spec.node_name.as_deref().unwrap_or("").is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadSpec {
    #[serde(rename = "nodeName", default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A host (node) as read from the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Host {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: HostSpec,
    #[serde(default)]
    pub status: HostStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Host {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// A host accepts new placements when it is not cordoned and reports
    /// `Ready=True`.
    pub fn is_schedulable(&self) -> bool {
        if self.spec.unschedulable {
            return false;
        }
        if self.spec.taints.iter().any(|t| t.key == UNSCHEDULABLE_TAINT) {
            return false;
        }
        self.status
            .conditions
            .iter()
            .any(|c| c.r#type == "Ready" && c.status == "True")
    }

    /// Allocatable CPU in millicores; 0 when unreported or unparseable.
    pub fn allocatable_cpu_millis(&self) -> i64 {
        self.status
            .allocatable
            .get("cpu")
            .and_then(|raw| parse_cpu_millis(raw))
            .unwrap_or(0)
    }

    /// Allocatable memory in bytes; 0 when unreported or unparseable.
    pub fn allocatable_memory_bytes(&self) -> i64 {
        self.status
            .allocatable
            .get("memory")
            .and_then(|raw| parse_memory_bytes(raw))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostSpec {
    #[serde(default)]
    pub unschedulable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<HostCondition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub allocatable: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostCondition {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ready_host(name: &str) -> Value {
        json!({
            "metadata": {"name": name},
            "status": {
                "conditions": [{"type": "Ready", "status": "True"}],
                "allocatable": {"cpu": "4", "memory": "8Gi"}
            }
        })
    }

    #[test]
    fn extender_args_accepts_nodenames_form() {
        let args: ExtenderArgs = serde_json::from_value(json!({
            "pod": {"metadata": {"name": "cartservice-5f8d-1"}},
            "nodenames": ["h1", "h2"]
        }))
        .unwrap();

        assert_eq!(args.pod.name(), "cartservice-5f8d-1");
        assert!(args.nodes.is_none());
        assert_eq!(args.nodenames.unwrap(), vec!["h1", "h2"]);
    }

    #[test]
    fn extender_args_requires_pod() {
        let malformed = serde_json::from_value::<ExtenderArgs>(json!({"nodenames": ["h1"]}));
        assert!(malformed.is_err());
    }

    #[test]
    fn host_passes_unknown_fields_through() {
        let mut raw = ready_host("h1");
        raw["apiVersion"] = json!("v1");
        raw["metadata"]["labels"] = json!({"zone": "us-east-1a"});

        let host: Host = serde_json::from_value(raw).unwrap();
        let echoed = serde_json::to_value(&host).unwrap();

        assert_eq!(echoed["apiVersion"], "v1");
        assert_eq!(echoed["metadata"]["labels"]["zone"], "us-east-1a");
        assert_eq!(echoed["metadata"]["name"], "h1");
    }

    #[test]
    fn filter_result_renames_failed_nodes() {
        let mut result = FilterResult::default();
        result
            .failed_nodes
            .insert("h3".to_string(), "Node not schedulable".to_string());

        let raw = serde_json::to_value(&result).unwrap();
        assert_eq!(raw["failedNodes"]["h3"], "Node not schedulable");
    }

    #[test]
    fn schedulable_requires_ready_condition() {
        let ready: Host = serde_json::from_value(ready_host("h1")).unwrap();
        assert!(ready.is_schedulable());

        let unready: Host = serde_json::from_value(json!({
            "metadata": {"name": "h2"},
            "status": {"conditions": [{"type": "Ready", "status": "False"}]}
        }))
        .unwrap();
        assert!(!unready.is_schedulable());
    }

    #[test]
    fn unschedulable_taint_blocks_placement() {
        let mut raw = ready_host("h3");
        raw["spec"] = json!({"taints": [{"key": UNSCHEDULABLE_TAINT, "effect": "NoSchedule"}]});
        let host: Host = serde_json::from_value(raw).unwrap();
        assert!(!host.is_schedulable());
    }

    #[test]
    fn cordoned_spec_blocks_placement() {
        let mut raw = ready_host("h4");
        raw["spec"] = json!({"unschedulable": true});
        let host: Host = serde_json::from_value(raw).unwrap();
        assert!(!host.is_schedulable());
    }

    #[test]
    fn allocatable_accessors_default_to_zero() {
        let host: Host = serde_json::from_value(json!({"metadata": {"name": "bare"}})).unwrap();
        assert_eq!(host.allocatable_cpu_millis(), 0);
        assert_eq!(host.allocatable_memory_bytes(), 0);

        let full: Host = serde_json::from_value(ready_host("h1")).unwrap();
        assert_eq!(full.allocatable_cpu_millis(), 4000);
        assert_eq!(full.allocatable_memory_bytes(), 8 * 1024 * 1024 * 1024);
    }

    #[test]
    fn workload_unscheduled_means_no_host_assignment() {
        let pending: Workload = serde_json::from_value(json!({
            "metadata": {"name": "cartservice-5f8d-1"}
        }))
        .unwrap();
        assert!(pending.is_unscheduled());

        let placed: Workload = serde_json::from_value(json!({
            "metadata": {"name": "cartservice-5f8d-1"},
            "spec": {"nodeName": "h2"}
        }))
        .unwrap();
        assert!(!placed.is_unscheduled());
    }
}
