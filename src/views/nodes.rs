//! Node view-model assembly.

use chrono::Utc;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::ResourceExt;

use crate::errors::Result;
use crate::k8s::cache::ResourceCache;
use crate::metrics::MetricsSource;
use crate::utils::quantity::{cpu_milli, mem_bytes};
use crate::views::pods::pod_requested;
use crate::views::types::{age_seconds, NodePodEntry, NodeSystemView, NodeView};

const PRESSURE_CONDITIONS: [&str; 3] = ["MemoryPressure", "DiskPressure", "PIDPressure"];

/// "control-plane" when labelled as such, else "worker".
pub fn node_role(node: &Node) -> String {
    let labelled = node.metadata.labels.as_ref().map(|labels| {
        labels.contains_key("node-role.kubernetes.io/control-plane")
            || labels.contains_key("node-role.kubernetes.io/master")
    });
    if labelled == Some(true) {
        "control-plane".to_string()
    } else {
        "worker".to_string()
    }
}

pub fn node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// Pressure conditions currently True.
pub fn node_pressures(node: &Node) -> Vec<String> {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .filter(|c| PRESSURE_CONDITIONS.contains(&c.type_.as_str()) && c.status == "True")
                .map(|c| c.type_.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn node_address(node: &Node, kind: &str) -> Option<String> {
    node.status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .and_then(|addrs| addrs.iter().find(|a| a.type_ == kind))
        .map(|a| a.address.clone())
}

fn node_system(node: &Node) -> NodeSystemView {
    match node.status.as_ref().and_then(|s| s.node_info.as_ref()) {
        Some(info) => NodeSystemView {
            operating_system: info.operating_system.clone(),
            os_image: info.os_image.clone(),
            kernel_version: info.kernel_version.clone(),
            kubelet_version: info.kubelet_version.clone(),
            container_runtime: info.container_runtime_version.clone(),
            architecture: info.architecture.clone(),
        },
        None => NodeSystemView::default(),
    }
}

/// Assemble one NodeView. `pods` must already be filtered to this node.
pub fn build_node_view(node: &Node, pods: &[&Pod], used: (i64, i64)) -> NodeView {
    let now = Utc::now();
    let status = node.status.as_ref();
    let capacity = status.and_then(|s| s.capacity.as_ref());
    let allocatable = status.and_then(|s| s.allocatable.as_ref());
    let created_at = node.metadata.creation_timestamp.as_ref().map(|t| t.0);

    let pod_entries = pods
        .iter()
        .map(|pod| {
            let (cpu, mem) = pod_requested(pod);
            NodePodEntry {
                namespace: pod.namespace().unwrap_or_default(),
                name: pod.name_any(),
                requested_cpu_milli: cpu,
                requested_mem_bytes: mem,
            }
        })
        .collect();

    NodeView {
        name: node.name_any(),
        role: node_role(node),
        ready: node_ready(node),
        pressures: node_pressures(node),
        internal_ip: node_address(node, "InternalIP"),
        external_ip: node_address(node, "ExternalIP"),
        hostname: node_address(node, "Hostname"),
        system: node_system(node),
        capacity_cpu_milli: cpu_milli(capacity.and_then(|c| c.get("cpu"))),
        capacity_mem_bytes: mem_bytes(capacity.and_then(|c| c.get("memory"))),
        capacity_pods: capacity
            .and_then(|c| c.get("pods"))
            .and_then(|q| q.0.parse().ok())
            .unwrap_or(0),
        allocatable_cpu_milli: cpu_milli(allocatable.and_then(|a| a.get("cpu"))),
        allocatable_mem_bytes: mem_bytes(allocatable.and_then(|a| a.get("memory"))),
        used_cpu_milli: used.0,
        used_mem_bytes: used.1,
        pods: pod_entries,
        age_seconds: age_seconds(created_at.as_ref(), now),
        created_at,
    }
}

/// Assemble NodeViews for every cached node, ordered by name. Usage lookups
/// that fail contribute zero.
pub async fn build_node_views(
    cache: &ResourceCache,
    source: &dyn MetricsSource,
) -> Result<Vec<NodeView>> {
    cache.nodes.ensure_readable()?;
    cache.pods.ensure_readable()?;

    let nodes = cache.nodes.list();
    let pods = cache.pods.list();

    let mut views = Vec::with_capacity(nodes.len());
    for node in &nodes {
        let name = node.name_any();
        let on_node: Vec<&Pod> = pods
            .iter()
            .filter(|p| {
                p.spec.as_ref().and_then(|s| s.node_name.as_deref()) == Some(name.as_str())
            })
            .map(|p| p.as_ref())
            .collect();
        let used = match source.get_node_metrics(&name).await {
            Ok(m) => (m.cpu_milli, m.mem_bytes),
            Err(_) => (0, 0),
        };
        views.push(build_node_view(node, &on_node, used));
    }
    views.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(views)
}
