//! ClusterSummary assembly.
//!
//! `summarize` is pure over already-snapshotted inputs; `build_cluster_summary`
//! gathers those inputs from the caches and metrics source.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{Node, PersistentVolume, PersistentVolumeClaim, Pod};
use kube::ResourceExt;

use crate::errors::Result;
use crate::k8s::cache::ResourceCache;
use crate::metrics::MetricsSource;
use crate::utils::quantity::{cpu_milli, mem_bytes};
use crate::views::pods::pod_requested;
use crate::views::types::{ClusterIdentity, ClusterSummary, WorkloadRatio};

use super::nodes::{node_pressures, node_ready};

/// Snapshotted inputs for one summary assembly. `node_usage` maps node name
/// to (cpu milli, mem bytes); absent nodes contribute zero.
pub struct SummaryInputs<'a> {
    pub identity: &'a ClusterIdentity,
    pub namespaces_count: usize,
    pub nodes: &'a [Arc<Node>],
    pub pods: &'a [Arc<Pod>],
    pub deployments: &'a [Arc<Deployment>],
    pub daemon_sets: &'a [Arc<DaemonSet>],
    pub replica_sets: &'a [Arc<ReplicaSet>],
    pub stateful_sets: &'a [Arc<StatefulSet>],
    pub jobs_count: usize,
    pub cron_jobs_count: usize,
    pub persistent_volumes: &'a [Arc<PersistentVolume>],
    pub persistent_volume_claims: &'a [Arc<PersistentVolumeClaim>],
    pub node_usage: &'a HashMap<String, (i64, i64)>,
}

pub fn summarize(inputs: SummaryInputs<'_>) -> ClusterSummary {
    let mut summary = ClusterSummary {
        cluster_name: inputs.identity.cluster_name.clone(),
        server_version: inputs.identity.server_version.clone(),
        namespaces_count: inputs.namespaces_count,
        jobs_count: inputs.jobs_count,
        cron_jobs_count: inputs.cron_jobs_count,
        timestamp: Utc::now(),
        ..ClusterSummary::default()
    };

    summary.nodes_count = inputs.nodes.len();
    for node in inputs.nodes {
        if node_ready(node) {
            summary.nodes_ready += 1;
        }
        if !node_pressures(node).is_empty() {
            summary.nodes_with_pressure += 1;
        }
        if let Some(status) = &node.status {
            summary.images_count += status.images.as_ref().map(Vec::len).unwrap_or(0);
            summary.volumes_in_use += status.volumes_in_use.as_ref().map(Vec::len).unwrap_or(0);
            if let Some(allocatable) = &status.allocatable {
                summary.allocatable_cpu_milli += cpu_milli(allocatable.get("cpu"));
                summary.allocatable_mem_bytes += mem_bytes(allocatable.get("memory"));
            }
        }
        if let Some((cpu, mem)) = inputs.node_usage.get(&node.name_any()) {
            summary.used_cpu_milli += cpu;
            summary.used_mem_bytes += mem;
        }
        if let Some(created) = node.metadata.creation_timestamp.as_ref().map(|t| t.0) {
            if summary
                .oldest_node_created
                .map(|oldest| created < oldest)
                .unwrap_or(true)
            {
                summary.oldest_node_created = Some(created);
            }
        }
    }

    for pod in inputs.pods {
        summary.pods_count += 1;
        if pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running") {
            summary.pods_running += 1;
        }
        let (cpu, mem) = pod_requested(pod);
        summary.requested_cpu_milli += cpu;
        summary.requested_mem_bytes += mem;
    }

    summary.deployments = inputs
        .deployments
        .iter()
        .fold(WorkloadRatio::default(), |mut acc, d| {
            acc.desired += d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1) as i64;
            acc.ready += d
                .status
                .as_ref()
                .and_then(|s| s.ready_replicas)
                .unwrap_or(0) as i64;
            acc
        });
    summary.daemon_sets = inputs
        .daemon_sets
        .iter()
        .fold(WorkloadRatio::default(), |mut acc, d| {
            if let Some(status) = &d.status {
                acc.desired += status.desired_number_scheduled as i64;
                acc.ready += status.number_ready as i64;
            }
            acc
        });
    summary.replica_sets = inputs
        .replica_sets
        .iter()
        .fold(WorkloadRatio::default(), |mut acc, r| {
            acc.desired += r.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1) as i64;
            acc.ready += r
                .status
                .as_ref()
                .and_then(|s| s.ready_replicas)
                .unwrap_or(0) as i64;
            acc
        });
    summary.stateful_sets = inputs
        .stateful_sets
        .iter()
        .fold(WorkloadRatio::default(), |mut acc, s| {
            acc.desired += s.spec.as_ref().and_then(|sp| sp.replicas).unwrap_or(1) as i64;
            acc.ready += s
                .status
                .as_ref()
                .and_then(|st| st.ready_replicas)
                .unwrap_or(0) as i64;
            acc
        });

    for pv in inputs.persistent_volumes {
        summary.pv_count += 1;
        if pv.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Bound") {
            summary.pv_bound += 1;
        }
        summary.pv_capacity_bytes += pv
            .spec
            .as_ref()
            .and_then(|s| s.capacity.as_ref())
            .map(|c| mem_bytes(c.get("storage")))
            .unwrap_or(0);
    }

    for pvc in inputs.persistent_volume_claims {
        summary.pvc_count += 1;
        if pvc.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Bound") {
            summary.pvc_bound += 1;
        }
        summary.pvc_capacity_bytes += pvc
            .status
            .as_ref()
            .and_then(|s| s.capacity.as_ref())
            .map(|c| mem_bytes(c.get("storage")))
            .unwrap_or(0);
    }

    summary
}

/// Assemble the cluster summary from cache snapshots and per-node metric
/// lookups. Metric failures contribute zero to used totals.
pub async fn build_cluster_summary(
    cache: &ResourceCache,
    source: &dyn MetricsSource,
    identity: &ClusterIdentity,
) -> Result<ClusterSummary> {
    cache.namespaces.ensure_readable()?;
    cache.nodes.ensure_readable()?;
    cache.pods.ensure_readable()?;

    let nodes = cache.nodes.list();
    let mut node_usage = HashMap::new();
    for node in &nodes {
        let name = node.name_any();
        if let Ok(m) = source.get_node_metrics(&name).await {
            node_usage.insert(name, (m.cpu_milli, m.mem_bytes));
        }
    }

    Ok(summarize(SummaryInputs {
        identity,
        namespaces_count: cache.namespaces.len(),
        nodes: &nodes,
        pods: &cache.pods.list(),
        deployments: &cache.deployments.list(),
        daemon_sets: &cache.daemon_sets.list(),
        replica_sets: &cache.replica_sets.list(),
        stateful_sets: &cache.stateful_sets.list(),
        jobs_count: cache.jobs.len(),
        cron_jobs_count: cache.cron_jobs.len(),
        persistent_volumes: &cache.persistent_volumes.list(),
        persistent_volume_claims: &cache.persistent_volume_claims.list(),
        node_usage: &node_usage,
    }))
}
