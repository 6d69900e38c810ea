//! Container view-model assembly for the container detail screen.

use k8s_openapi::api::core::v1::{Container, ContainerStatus, Pod};

use crate::metrics::PodMetric;
use crate::utils::quantity::{cpu_milli, mem_bytes};
use crate::views::types::{ContainerStateKind, ContainerView};

/// Some aggregated sources report a single synthetic "main" series instead
/// of the container's real name. The fallback applies only when the pod has
/// exactly one container.
const SYNTHETIC_MAIN: &str = "main";

fn port_label(port: &k8s_openapi::api::core::v1::ContainerPort) -> String {
    let protocol = port.protocol.as_deref().unwrap_or("TCP");
    format!("{}/{}", port.container_port, protocol)
}

fn build_one(
    container: &Container,
    init: bool,
    status: Option<&ContainerStatus>,
    usage: (i64, i64),
) -> ContainerView {
    let requests = container
        .resources
        .as_ref()
        .and_then(|r| r.requests.as_ref());
    let limits = container.resources.as_ref().and_then(|r| r.limits.as_ref());

    let state = status.and_then(|s| s.state.as_ref());
    let (kind, started_at, exit_code, reason, message) = if let Some(s) = state {
        if let Some(running) = &s.running {
            (
                ContainerStateKind::Running,
                running.started_at.as_ref().map(|t| t.0),
                None,
                None,
                None,
            )
        } else if let Some(waiting) = &s.waiting {
            (
                ContainerStateKind::Waiting,
                None,
                None,
                waiting.reason.clone(),
                waiting.message.clone(),
            )
        } else if let Some(term) = &s.terminated {
            (
                ContainerStateKind::Terminated,
                term.started_at.as_ref().map(|t| t.0),
                Some(term.exit_code),
                term.reason.clone(),
                term.message.clone(),
            )
        } else {
            (ContainerStateKind::Unknown, None, None, None, None)
        }
    } else {
        (ContainerStateKind::Unknown, None, None, None, None)
    };

    ContainerView {
        name: container.name.clone(),
        init,
        image: container.image.clone(),
        command: container.command.clone().unwrap_or_default(),
        args: container.args.clone().unwrap_or_default(),
        ports: container
            .ports
            .as_ref()
            .map(|ports| ports.iter().map(port_label).collect())
            .unwrap_or_default(),
        env_count: container.env.as_ref().map(Vec::len).unwrap_or(0),
        mounts_count: container.volume_mounts.as_ref().map(Vec::len).unwrap_or(0),
        has_liveness_probe: container.liveness_probe.is_some(),
        has_readiness_probe: container.readiness_probe.is_some(),
        requested_cpu_milli: cpu_milli(requests.and_then(|r| r.get("cpu"))),
        requested_mem_bytes: mem_bytes(requests.and_then(|r| r.get("memory"))),
        limit_cpu_milli: cpu_milli(limits.and_then(|l| l.get("cpu"))),
        limit_mem_bytes: mem_bytes(limits.and_then(|l| l.get("memory"))),
        state: kind,
        started_at,
        ready: status.map(|s| s.ready).unwrap_or(false),
        restart_count: status.map(|s| s.restart_count).unwrap_or(0),
        exit_code,
        reason,
        message,
        used_cpu_milli: usage.0,
        used_mem_bytes: usage.1,
    }
}

/// Container usage by name, with the single-container "main" fallback.
fn container_usage(
    metrics: Option<&PodMetric>,
    name: &str,
    single_container_pod: bool,
) -> (i64, i64) {
    let metrics = match metrics {
        Some(m) => m,
        None => return (0, 0),
    };
    if let Some(c) = metrics.container(name) {
        return (c.cpu_milli, c.mem_bytes);
    }
    if single_container_pod {
        if let Some(c) = metrics.container(SYNTHETIC_MAIN) {
            return (c.cpu_milli, c.mem_bytes);
        }
    }
    (0, 0)
}

/// Assemble views for every container of a pod: spec from
/// containers ∪ initContainers, status matched by name from
/// containerStatuses ∪ initContainerStatuses.
pub fn build_container_views(pod: &Pod, metrics: Option<&PodMetric>) -> Vec<ContainerView> {
    let spec = match &pod.spec {
        Some(spec) => spec,
        None => return Vec::new(),
    };
    let status = pod.status.as_ref();
    let main_statuses = status
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or(&[]);
    let init_statuses = status
        .and_then(|s| s.init_container_statuses.as_deref())
        .unwrap_or(&[]);
    let single = spec.containers.len() == 1;

    let mut views = Vec::new();
    for container in spec.init_containers.as_deref().unwrap_or(&[]) {
        let cs = init_statuses.iter().find(|s| s.name == container.name);
        let usage = container_usage(metrics, &container.name, false);
        views.push(build_one(container, true, cs, usage));
    }
    for container in &spec.containers {
        let cs = main_statuses.iter().find(|s| s.name == container.name);
        let usage = container_usage(metrics, &container.name, single);
        views.push(build_one(container, false, cs, usage));
    }
    views
}
