use std::collections::BTreeMap;

use chrono::Utc;
use k8s_openapi::api::core::v1::{
    Container, ContainerState, ContainerStateRunning, ContainerStateTerminated,
    ContainerStateWaiting, ContainerStatus, Pod, PodCondition, PodSpec, PodStatus,
    ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::core::ObjectMeta;

use kubepulse::metrics::{ContainerMetric, PodMetric};
use kubepulse::views::build_container_views;
use kubepulse::views::pods::{
    build_pod_view, derive_pod_status, pod_requested, ready_containers, total_restarts,
};
use kubepulse::views::types::ContainerStateKind;

fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    let mut map = BTreeMap::new();
    map.insert("cpu".to_string(), Quantity(cpu.to_string()));
    map.insert("memory".to_string(), Quantity(memory.to_string()));
    map
}

fn container(name: &str, cpu_request: &str, mem_request: &str) -> Container {
    Container {
        name: name.to_string(),
        resources: Some(ResourceRequirements {
            requests: Some(quantities(cpu_request, mem_request)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn running_status(name: &str, ready: bool) -> ContainerStatus {
    ContainerStatus {
        name: name.to_string(),
        ready,
        restart_count: 0,
        state: Some(ContainerState {
            running: Some(ContainerStateRunning {
                started_at: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn waiting_status(name: &str, reason: &str) -> ContainerStatus {
    ContainerStatus {
        name: name.to_string(),
        ready: false,
        restart_count: 0,
        state: Some(ContainerState {
            waiting: Some(ContainerStateWaiting {
                reason: Some(reason.to_string()),
                message: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn terminated_status(name: &str, exit_code: i32, signal: Option<i32>, reason: Option<&str>) -> ContainerStatus {
    ContainerStatus {
        name: name.to_string(),
        ready: false,
        restart_count: 0,
        state: Some(ContainerState {
            terminated: Some(ContainerStateTerminated {
                exit_code,
                signal,
                reason: reason.map(str::to_string),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod(containers: Vec<Container>, statuses: Vec<ContainerStatus>, phase: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some("web-0".to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers,
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            container_statuses: Some(statuses),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[test]
fn test_waiting_reason_wins() {
    // scenario: A waiting on ImagePullBackOff, B running and ready
    let p = pod(
        vec![container("a", "100m", "128Mi"), container("b", "100m", "128Mi")],
        vec![
            waiting_status("a", "ImagePullBackOff"),
            running_status("b", true),
        ],
        "Pending",
    );
    assert_eq!(derive_pod_status(&p), "ImagePullBackOff");
    assert_eq!(ready_containers(&p), 1);
    let view = build_pod_view(&p, None, None, None);
    assert_eq!(view.ready_containers, 1);
    assert_eq!(view.total_containers, 2);
}

#[test]
fn test_terminated_reason_beats_exit_code() {
    let p = pod(
        vec![container("a", "100m", "128Mi")],
        vec![terminated_status("a", 137, None, Some("OOMKilled"))],
        "Running",
    );
    assert_eq!(derive_pod_status(&p), "OOMKilled");
}

#[test]
fn test_bare_termination_formats_exit_and_signal() {
    let p = pod(
        vec![container("a", "100m", "128Mi")],
        vec![terminated_status("a", 2, None, None)],
        "Running",
    );
    assert_eq!(derive_pod_status(&p), "Exit:2");

    let p = pod(
        vec![container("a", "100m", "128Mi")],
        vec![terminated_status("a", 137, Some(9), None)],
        "Running",
    );
    assert_eq!(derive_pod_status(&p), "Sig:9");
}

#[test]
fn test_all_running_ready_is_running() {
    let p = pod(
        vec![container("a", "100m", "128Mi")],
        vec![running_status("a", true)],
        "Running",
    );
    assert_eq!(derive_pod_status(&p), "Running");
}

#[test]
fn test_pod_ready_condition_false_overrides_running() {
    let mut p = pod(
        vec![container("a", "100m", "128Mi")],
        vec![running_status("a", true)],
        "Running",
    );
    p.status.as_mut().unwrap().conditions = Some(vec![PodCondition {
        type_: "Ready".to_string(),
        status: "False".to_string(),
        ..Default::default()
    }]);
    assert_eq!(derive_pod_status(&p), "NotReady");
}

#[test]
fn test_succeeded_phase_reads_completed() {
    let p = pod(
        vec![container("a", "100m", "128Mi")],
        vec![],
        "Succeeded",
    );
    assert_eq!(derive_pod_status(&p), "Completed");
}

#[test]
fn test_requests_include_init_containers_and_overhead() {
    let mut p = pod(vec![container("a", "100m", "128Mi")], vec![], "Running");
    {
        let spec = p.spec.as_mut().unwrap();
        spec.init_containers = Some(vec![container("init", "50m", "64Mi")]);
        spec.overhead = Some(quantities("10m", "16Mi"));
    }
    let (cpu, mem) = pod_requested(&p);
    assert_eq!(cpu, 160);
    assert_eq!(mem, (128 + 64 + 16) * 1024 * 1024);
}

#[test]
fn test_restart_total_spans_init_and_main() {
    let mut p = pod(
        vec![container("a", "100m", "128Mi")],
        vec![ContainerStatus {
            restart_count: 3,
            ..running_status("a", true)
        }],
        "Running",
    );
    p.status.as_mut().unwrap().init_container_statuses = Some(vec![ContainerStatus {
        restart_count: 2,
        ..terminated_status("init", 0, None, Some("Completed"))
    }]);
    assert_eq!(total_restarts(&p), 5);
}

#[test]
fn test_pod_view_usage_from_metrics() {
    let p = pod(
        vec![container("a", "100m", "128Mi")],
        vec![running_status("a", true)],
        "Running",
    );
    let metrics = PodMetric {
        namespace: "default".to_string(),
        pod: "web-0".to_string(),
        containers: vec![ContainerMetric {
            name: "a".to_string(),
            cpu_milli: 300,
            mem_bytes: 1024 * 1024 * 1024,
            cpu_throttle_ratio: None,
            mem_limit_bytes: None,
            restarts: None,
        }],
        timestamp: Utc::now(),
    };
    let view = build_pod_view(&p, Some(&metrics), None, None);
    assert_eq!(view.used_cpu_milli, 300);
    assert_eq!(view.used_mem_bytes, 1024 * 1024 * 1024);
    // metrics absent degrades to zero
    let view = build_pod_view(&p, None, None, None);
    assert_eq!(view.used_cpu_milli, 0);
}

#[test]
fn test_container_views_resolve_spec_and_status() {
    let p = pod(
        vec![container("a", "100m", "128Mi")],
        vec![waiting_status("a", "CrashLoopBackOff")],
        "Running",
    );
    let views = build_container_views(&p, None);
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].state, ContainerStateKind::Waiting);
    assert_eq!(views[0].reason.as_deref(), Some("CrashLoopBackOff"));
    assert_eq!(views[0].requested_cpu_milli, 100);
}

#[test]
fn test_container_metrics_main_fallback_single_container_only() {
    let metrics = PodMetric {
        namespace: "default".to_string(),
        pod: "web-0".to_string(),
        containers: vec![ContainerMetric {
            name: "main".to_string(),
            cpu_milli: 250,
            mem_bytes: 512,
            cpu_throttle_ratio: None,
            mem_limit_bytes: None,
            restarts: None,
        }],
        timestamp: Utc::now(),
    };

    // single-container pod: synthetic "main" applies
    let single = pod(
        vec![container("app", "100m", "128Mi")],
        vec![running_status("app", true)],
        "Running",
    );
    let views = build_container_views(&single, Some(&metrics));
    assert_eq!(views[0].used_cpu_milli, 250);

    // two containers: no fallback, usage stays zero
    let double = pod(
        vec![
            container("app", "100m", "128Mi"),
            container("sidecar", "100m", "128Mi"),
        ],
        vec![running_status("app", true), running_status("sidecar", true)],
        "Running",
    );
    let views = build_container_views(&double, Some(&metrics));
    assert!(views.iter().all(|v| v.used_cpu_milli == 0));
}

#[test]
fn test_init_containers_listed_before_main() {
    let mut p = pod(
        vec![container("app", "100m", "128Mi")],
        vec![running_status("app", true)],
        "Running",
    );
    p.spec.as_mut().unwrap().init_containers = Some(vec![container("setup", "50m", "64Mi")]);
    let views = build_container_views(&p, None);
    assert_eq!(views.len(), 2);
    assert!(views[0].init);
    assert_eq!(views[0].name, "setup");
    assert!(!views[1].init);
}
