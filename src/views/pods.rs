//! Pod view-model assembly and the status derivation rules.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::core::v1::{Container, Node, Pod};
use kube::ResourceExt;

use crate::errors::Result;
use crate::k8s::cache::ResourceCache;
use crate::metrics::{MetricsSource, NodeMetric, PodMetric};
use crate::utils::quantity::{cpu_milli, mem_bytes};
use crate::views::types::{age_seconds, PodView};

/// Requested CPU/memory summed over one container list.
fn sum_requests(containers: &[Container]) -> (i64, i64) {
    containers
        .iter()
        .filter_map(|c| c.resources.as_ref())
        .filter_map(|r| r.requests.as_ref())
        .fold((0, 0), |(cpu, mem), req| {
            (
                cpu + cpu_milli(req.get("cpu")),
                mem + mem_bytes(req.get("memory")),
            )
        })
}

fn sum_limits(containers: &[Container]) -> (i64, i64) {
    containers
        .iter()
        .filter_map(|c| c.resources.as_ref())
        .filter_map(|r| r.limits.as_ref())
        .fold((0, 0), |(cpu, mem), lim| {
            (
                cpu + cpu_milli(lim.get("cpu")),
                mem + mem_bytes(lim.get("memory")),
            )
        })
}

/// Total requested CPU/memory for a pod: containers, init containers, and
/// pod overhead.
pub fn pod_requested(pod: &Pod) -> (i64, i64) {
    let spec = match &pod.spec {
        Some(spec) => spec,
        None => return (0, 0),
    };
    let (mut cpu, mut mem) = sum_requests(&spec.containers);
    if let Some(init) = &spec.init_containers {
        let (c, m) = sum_requests(init);
        cpu += c;
        mem += m;
    }
    if let Some(overhead) = &spec.overhead {
        cpu += cpu_milli(overhead.get("cpu"));
        mem += mem_bytes(overhead.get("memory"));
    }
    (cpu, mem)
}

/// Total CPU/memory limits for a pod, same contributions as requests.
pub fn pod_limits(pod: &Pod) -> (i64, i64) {
    let spec = match &pod.spec {
        Some(spec) => spec,
        None => return (0, 0),
    };
    let (mut cpu, mut mem) = sum_limits(&spec.containers);
    if let Some(init) = &spec.init_containers {
        let (c, m) = sum_limits(init);
        cpu += c;
        mem += m;
    }
    if let Some(overhead) = &spec.overhead {
        cpu += cpu_milli(overhead.get("cpu"));
        mem += mem_bytes(overhead.get("memory"));
    }
    (cpu, mem)
}

/// Containers that are both ready and running.
pub fn ready_containers(pod: &Pod) -> usize {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .filter(|cs| {
                    cs.ready
                        && cs
                            .state
                            .as_ref()
                            .map(|st| st.running.is_some())
                            .unwrap_or(false)
                })
                .count()
        })
        .unwrap_or(0)
}

/// Sum of restart counts over init and main container statuses.
pub fn total_restarts(pod: &Pod) -> i64 {
    let status = match &pod.status {
        Some(status) => status,
        None => return 0,
    };
    status
        .init_container_statuses
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .chain(status.container_statuses.as_deref().unwrap_or(&[]).iter())
        .map(|cs| cs.restart_count as i64)
        .sum()
}

/// Derive the display status by examining container statuses in order:
/// waiting reason, terminated reason, bare termination as "Sig:n"/"Exit:n",
/// Running (overridden to NotReady when the pod's Ready condition is False),
/// then Completed or empty.
pub fn derive_pod_status(pod: &Pod) -> String {
    let status = match &pod.status {
        Some(status) => status,
        None => return String::new(),
    };
    let statuses = status.container_statuses.as_deref().unwrap_or(&[]);

    for cs in statuses {
        if let Some(waiting) = cs.state.as_ref().and_then(|s| s.waiting.as_ref()) {
            if let Some(reason) = waiting.reason.as_deref().filter(|r| !r.is_empty()) {
                return reason.to_string();
            }
        }
    }
    for cs in statuses {
        if let Some(term) = cs.state.as_ref().and_then(|s| s.terminated.as_ref()) {
            if let Some(reason) = term.reason.as_deref().filter(|r| !r.is_empty()) {
                return reason.to_string();
            }
        }
    }
    for cs in statuses {
        if let Some(term) = cs.state.as_ref().and_then(|s| s.terminated.as_ref()) {
            return match term.signal {
                Some(sig) => format!("Sig:{}", sig),
                None => format!("Exit:{}", term.exit_code),
            };
        }
    }

    let all_running_ready = !statuses.is_empty()
        && statuses.iter().all(|cs| {
            cs.ready
                && cs
                    .state
                    .as_ref()
                    .map(|st| st.running.is_some())
                    .unwrap_or(false)
        });
    if all_running_ready {
        let pod_not_ready = status
            .conditions
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "False");
        return if pod_not_ready {
            "NotReady".to_string()
        } else {
            "Running".to_string()
        };
    }

    if status.phase.as_deref() == Some("Succeeded") {
        return "Completed".to_string();
    }
    String::new()
}

/// Assemble one PodView from the pod, its metrics (if any), and its node's
/// allocatable/usage for percentage displays.
pub fn build_pod_view(
    pod: &Pod,
    metrics: Option<&PodMetric>,
    node: Option<&Node>,
    node_usage: Option<&NodeMetric>,
) -> PodView {
    let now = Utc::now();
    let (requested_cpu_milli, requested_mem_bytes) = pod_requested(pod);
    let (limit_cpu_milli, limit_mem_bytes) = pod_limits(pod);

    let (node_alloc_cpu, node_alloc_mem) = node
        .and_then(|n| n.status.as_ref())
        .and_then(|s| s.allocatable.as_ref())
        .map(|a| (cpu_milli(a.get("cpu")), mem_bytes(a.get("memory"))))
        .unwrap_or((0, 0));

    let total_containers = pod
        .spec
        .as_ref()
        .map(|s| s.containers.len())
        .unwrap_or(0);

    let created_at = pod.metadata.creation_timestamp.as_ref().map(|t| t.0);

    PodView {
        namespace: pod.namespace().unwrap_or_default(),
        name: pod.name_any(),
        node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        phase: pod
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_default(),
        status: derive_pod_status(pod),
        ready_containers: ready_containers(pod),
        total_containers,
        restarts: total_restarts(pod),
        requested_cpu_milli,
        requested_mem_bytes,
        limit_cpu_milli,
        limit_mem_bytes,
        used_cpu_milli: metrics.map(|m| m.total_cpu_milli()).unwrap_or(0),
        used_mem_bytes: metrics.map(|m| m.total_mem_bytes()).unwrap_or(0),
        node_allocatable_cpu_milli: node_alloc_cpu,
        node_allocatable_mem_bytes: node_alloc_mem,
        node_used_cpu_milli: node_usage.map(|u| u.cpu_milli).unwrap_or(0),
        node_used_mem_bytes: node_usage.map(|u| u.mem_bytes).unwrap_or(0),
        volumes_count: pod
            .spec
            .as_ref()
            .and_then(|s| s.volumes.as_ref())
            .map(Vec::len)
            .unwrap_or(0),
        age_seconds: age_seconds(created_at.as_ref(), now),
        created_at,
    }
}

/// Assemble PodViews for every cached pod, default-ordered by
/// (namespace, name). Metric failures degrade to zero usage.
pub async fn build_pod_views(
    cache: &ResourceCache,
    source: &dyn MetricsSource,
) -> Result<Vec<PodView>> {
    cache.pods.ensure_readable()?;
    let pods = cache.pods.list();

    let pod_metrics: HashMap<(String, String), PodMetric> = match source.get_all_pod_metrics().await
    {
        Ok(list) => list
            .into_iter()
            .map(|m| ((m.namespace.clone(), m.pod.clone()), m))
            .collect(),
        Err(_) => HashMap::new(),
    };

    let nodes: HashMap<String, Arc<Node>> = cache
        .nodes
        .list()
        .into_iter()
        .map(|n| (n.name_any(), n))
        .collect();

    // One usage lookup per distinct node, not per pod.
    let mut node_usage: HashMap<String, NodeMetric> = HashMap::new();
    for pod in &pods {
        if let Some(node_name) = pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) {
            if !node_usage.contains_key(node_name) {
                if let Ok(usage) = source.get_node_metrics(node_name).await {
                    node_usage.insert(node_name.to_string(), usage);
                }
            }
        }
    }

    let mut views: Vec<PodView> = pods
        .iter()
        .map(|pod| {
            let key = (pod.namespace().unwrap_or_default(), pod.name_any());
            let node_name = pod.spec.as_ref().and_then(|s| s.node_name.as_deref());
            build_pod_view(
                pod,
                pod_metrics.get(&key),
                node_name.and_then(|n| nodes.get(n)).map(|n| n.as_ref()),
                node_name.and_then(|n| node_usage.get(n)),
            )
        })
        .collect();

    views.sort_by(|a, b| {
        a.namespace
            .cmp(&b.namespace)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(views)
}
