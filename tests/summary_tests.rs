use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{Duration, Utc};
use k8s_openapi::api::core::v1::{
    Container, Node, NodeCondition, NodeStatus, Pod, PodSpec, PodStatus, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::core::ObjectMeta;

use kubepulse::views::types::ClusterIdentity;
use kubepulse::views::{summarize, SummaryInputs};

fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    let mut map = BTreeMap::new();
    map.insert("cpu".to_string(), Quantity(cpu.to_string()));
    map.insert("memory".to_string(), Quantity(memory.to_string()));
    map
}

fn node(name: &str, cpu: &str, memory: &str, ready: bool) -> Arc<Node> {
    Arc::new(Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            creation_timestamp: Some(Time(Utc::now() - Duration::days(30))),
            ..Default::default()
        },
        status: Some(NodeStatus {
            allocatable: Some(quantities(cpu, memory)),
            capacity: Some(quantities(cpu, memory)),
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn running_pod(name: &str, cpu_request: &str, mem_request: &str) -> Arc<Pod> {
    Arc::new(Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "app".to_string(),
                resources: Some(ResourceRequirements {
                    requests: Some(quantities(cpu_request, mem_request)),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            node_name: Some("worker-1".to_string()),
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn inputs<'a>(
    identity: &'a ClusterIdentity,
    nodes: &'a [Arc<Node>],
    pods: &'a [Arc<Pod>],
    node_usage: &'a HashMap<String, (i64, i64)>,
) -> SummaryInputs<'a> {
    SummaryInputs {
        identity,
        namespaces_count: 1,
        nodes,
        pods,
        deployments: &[],
        daemon_sets: &[],
        replica_sets: &[],
        stateful_sets: &[],
        jobs_count: 0,
        cron_jobs_count: 0,
        persistent_volumes: &[],
        persistent_volume_claims: &[],
        node_usage,
    }
}

#[test]
fn test_cold_start_summary_numbers() {
    // 1 node at 4000m / 8Gi, 3 running pods each requesting 100m / 128Mi,
    // node usage 1200m / 4Gi
    let identity = ClusterIdentity::default();
    let nodes = vec![node("worker-1", "4", "8Gi", true)];
    let pods = vec![
        running_pod("web-0", "100m", "128Mi"),
        running_pod("web-1", "100m", "128Mi"),
        running_pod("web-2", "100m", "128Mi"),
    ];
    let mut usage = HashMap::new();
    usage.insert("worker-1".to_string(), (1200, 4 * 1024 * 1024 * 1024));

    let summary = summarize(inputs(&identity, &nodes, &pods, &usage));

    assert_eq!(summary.nodes_count, 1);
    assert_eq!(summary.nodes_ready, 1);
    assert_eq!(summary.pods_count, 3);
    assert_eq!(summary.pods_running, 3);
    assert_eq!(summary.allocatable_cpu_milli, 4000);
    assert_eq!(summary.requested_cpu_milli, 300);
    assert_eq!(summary.used_cpu_milli, 1200);
    assert!((summary.cpu_percent() - 30.0).abs() < 0.01);
    assert!((summary.mem_percent() - 50.0).abs() < 0.01);
}

#[test]
fn test_metrics_failure_contributes_zero_usage() {
    let identity = ClusterIdentity::default();
    let nodes = vec![node("worker-1", "4", "8Gi", true)];
    let pods = vec![running_pod("web-0", "100m", "128Mi")];
    let usage = HashMap::new();

    let summary = summarize(inputs(&identity, &nodes, &pods, &usage));
    assert_eq!(summary.used_cpu_milli, 0);
    assert_eq!(summary.cpu_percent(), 0.0);
    // everything else still tallies
    assert_eq!(summary.requested_cpu_milli, 100);
}

#[test]
fn test_not_ready_node_counts_total_only() {
    let identity = ClusterIdentity::default();
    let nodes = vec![
        node("worker-1", "4", "8Gi", true),
        node("worker-2", "4", "8Gi", false),
    ];
    let usage = HashMap::new();
    let summary = summarize(inputs(&identity, &nodes, &[], &usage));
    assert_eq!(summary.nodes_count, 2);
    assert_eq!(summary.nodes_ready, 1);
    assert_eq!(summary.allocatable_cpu_milli, 8000);
}

#[test]
fn test_same_inputs_summarize_identically() {
    let identity = ClusterIdentity {
        cluster_name: Some("prod".to_string()),
        server_version: Some("v1.28.0".to_string()),
    };
    let nodes = vec![node("worker-1", "4", "8Gi", true)];
    let pods = vec![running_pod("web-0", "100m", "128Mi")];
    let mut usage = HashMap::new();
    usage.insert("worker-1".to_string(), (500, 1024));

    let a = summarize(inputs(&identity, &nodes, &pods, &usage));
    let b = summarize(inputs(&identity, &nodes, &pods, &usage));

    // identical modulo the assembly timestamp
    assert_eq!(a.nodes_ready, b.nodes_ready);
    assert_eq!(a.requested_cpu_milli, b.requested_cpu_milli);
    assert_eq!(a.used_cpu_milli, b.used_cpu_milli);
    assert_eq!(a.oldest_node_created, b.oldest_node_created);
    assert_eq!(a.cluster_name, b.cluster_name);
}

#[test]
fn test_oldest_node_creation_is_recorded() {
    let identity = ClusterIdentity::default();
    let mut old_node = (*node("ancient", "4", "8Gi", true)).clone();
    let ancient = Utc::now() - Duration::days(400);
    old_node.metadata.creation_timestamp = Some(Time(ancient));
    let nodes = vec![node("worker-1", "4", "8Gi", true), Arc::new(old_node)];
    let usage = HashMap::new();
    let summary = summarize(inputs(&identity, &nodes, &[], &usage));
    assert_eq!(summary.oldest_node_created, Some(ancient));
}
