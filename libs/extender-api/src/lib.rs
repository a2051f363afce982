//! Wire contract for the surge advisory protocol.
//!
//! The primary scheduler calls the advisor's `/filter` and `/prioritize`
//! endpoints with a workload and a candidate host list; the advisor answers
//! with a host subset or per-host scores. Workload and Host objects are
//! opaque pass-throughs from the orchestrator's API: the advisor reads only
//! names, annotations, taints, conditions, and allocatable capacity, and
//! unknown fields survive a round trip untouched.

mod quantity;
mod types;

pub use quantity::{parse_cpu_millis, parse_memory_bytes};
pub use types::{
    ExtenderArgs, FilterResult, Host, HostCondition, HostList, HostPriority, HostSpec, HostStatus,
    ObjectMeta, Taint, Workload, WorkloadSpec, UNSCHEDULABLE_TAINT,
};
