//! View-models consumed by the UI screens.
//!
//! These are transient values: assembled per refresh from cache snapshots
//! and metric lookups, passed to consumer callbacks by value, never
//! persisted. Usage fields are zero when metrics are unavailable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ready/desired pair for one workload controller kind.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadRatio {
    pub ready: i64,
    pub desired: i64,
}

/// Cluster-wide counts and aggregates for the summary screen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSummary {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cluster_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub server_version: Option<String>,

    pub namespaces_count: usize,
    pub nodes_count: usize,
    pub nodes_ready: usize,
    pub nodes_with_pressure: usize,
    pub pods_count: usize,
    pub pods_running: usize,
    pub images_count: usize,
    pub volumes_in_use: usize,

    pub deployments: WorkloadRatio,
    pub daemon_sets: WorkloadRatio,
    pub replica_sets: WorkloadRatio,
    pub stateful_sets: WorkloadRatio,
    pub jobs_count: usize,
    pub cron_jobs_count: usize,

    pub allocatable_cpu_milli: i64,
    pub allocatable_mem_bytes: i64,
    pub requested_cpu_milli: i64,
    pub requested_mem_bytes: i64,
    pub used_cpu_milli: i64,
    pub used_mem_bytes: i64,

    pub pv_count: usize,
    pub pv_bound: usize,
    pub pv_capacity_bytes: i64,
    pub pvc_count: usize,
    pub pvc_bound: usize,
    pub pvc_capacity_bytes: i64,

    /// Oldest node creation time; stands in for cluster uptime.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub oldest_node_created: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

impl ClusterSummary {
    pub fn cpu_percent(&self) -> f64 {
        percent(self.used_cpu_milli, self.allocatable_cpu_milli)
    }

    pub fn mem_percent(&self) -> f64 {
        percent(self.used_mem_bytes, self.allocatable_mem_bytes)
    }
}

fn percent(used: i64, total: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        (used as f64 / total as f64) * 100.0
    }
}

/// Node OS/runtime block from status.nodeInfo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSystemView {
    pub operating_system: String,
    pub os_image: String,
    pub kernel_version: String,
    pub kubelet_version: String,
    pub container_runtime: String,
    pub architecture: String,
}

/// One pod scheduled on a node, with its requested totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePodEntry {
    pub namespace: String,
    pub name: String,
    pub requested_cpu_milli: i64,
    pub requested_mem_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeView {
    pub name: String,
    /// "control-plane" when labelled as such, else "worker".
    pub role: String,
    pub ready: bool,
    /// Pressure conditions currently True (MemoryPressure, DiskPressure, PIDPressure).
    pub pressures: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub internal_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub external_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hostname: Option<String>,
    pub system: NodeSystemView,

    pub capacity_cpu_milli: i64,
    pub capacity_mem_bytes: i64,
    pub capacity_pods: i64,
    pub allocatable_cpu_milli: i64,
    pub allocatable_mem_bytes: i64,
    pub used_cpu_milli: i64,
    pub used_mem_bytes: i64,

    pub pods: Vec<NodePodEntry>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created_at: Option<DateTime<Utc>>,
    pub age_seconds: i64,
}

impl NodeView {
    pub fn pods_count(&self) -> usize {
        self.pods.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodView {
    pub namespace: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub node_name: Option<String>,
    pub phase: String,
    /// Derived status (waiting/terminated reason, Running, NotReady, ...).
    pub status: String,
    pub ready_containers: usize,
    pub total_containers: usize,
    pub restarts: i64,

    pub requested_cpu_milli: i64,
    pub requested_mem_bytes: i64,
    pub limit_cpu_milli: i64,
    pub limit_mem_bytes: i64,
    pub used_cpu_milli: i64,
    pub used_mem_bytes: i64,

    /// Enclosing node's allocatable and usage, for percentage displays.
    pub node_allocatable_cpu_milli: i64,
    pub node_allocatable_mem_bytes: i64,
    pub node_used_cpu_milli: i64,
    pub node_used_mem_bytes: i64,

    pub volumes_count: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created_at: Option<DateTime<Utc>>,
    pub age_seconds: i64,
}

impl PodView {
    pub fn ready_ratio(&self) -> f64 {
        if self.total_containers == 0 {
            0.0
        } else {
            self.ready_containers as f64 / self.total_containers as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerStateKind {
    Running,
    Waiting,
    Terminated,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerView {
    pub name: String,
    /// True for init containers.
    pub init: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image: Option<String>,
    pub command: Vec<String>,
    pub args: Vec<String>,
    /// Ports as "8080/TCP" strings.
    pub ports: Vec<String>,
    pub env_count: usize,
    pub mounts_count: usize,
    pub has_liveness_probe: bool,
    pub has_readiness_probe: bool,

    pub requested_cpu_milli: i64,
    pub requested_mem_bytes: i64,
    pub limit_cpu_milli: i64,
    pub limit_mem_bytes: i64,

    pub state: ContainerStateKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at: Option<DateTime<Utc>>,
    pub ready: bool,
    pub restart_count: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,

    pub used_cpu_milli: i64,
    pub used_mem_bytes: i64,
}

/// One row for the event panes (node or pod scope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventView {
    pub name: String,
    pub namespace: String,
    pub event_type: String,
    pub reason: String,
    pub message: String,
    pub involved_kind: String,
    pub involved_name: String,
    pub count: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Identity facts resolved once at startup and stamped onto summaries.
#[derive(Debug, Clone, Default)]
pub struct ClusterIdentity {
    pub cluster_name: Option<String>,
    pub server_version: Option<String>,
}

pub(crate) fn age_seconds(created: Option<&DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    created
        .map(|c| (now - *c).num_seconds().max(0))
        .unwrap_or(0)
}
