use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use kubepulse::errors::{Error, Result};
use kubepulse::k8s::cache::ResourceCache;
use kubepulse::k8s::K8sClient;
use kubepulse::metrics::{
    MetricsHistory, MetricsSource, NodeMetric, PodMetric, SourceInfo, SourceKind,
};
use kubepulse::refresh::{HealthTracker, RefreshConfig, RefreshScheduler, ViewConsumer};
use kubepulse::views::types::{ClusterIdentity, ClusterSummary, NodeView, PodView};

/// Source stub answering with fixed values; never touches a cluster.
struct StubSource;

#[async_trait]
impl MetricsSource for StubSource {
    async fn start(&self, _shutdown: watch::Receiver<bool>) -> Result<()> {
        Ok(())
    }

    fn stop(&self) {}

    async fn get_node_metrics(&self, node: &str) -> Result<NodeMetric> {
        Ok(NodeMetric::zero(node))
    }

    async fn get_pod_metrics(&self, _namespace: &str, _pod: &str) -> Result<PodMetric> {
        Err(Error::MetricsUnavailable("stub".to_string()))
    }

    async fn get_all_pod_metrics(&self) -> Result<Vec<PodMetric>> {
        Ok(vec![])
    }

    fn available_metric_names(&self) -> Vec<String> {
        vec![]
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn source_info(&self) -> SourceInfo {
        SourceInfo::new(SourceKind::MetricsAggregator)
    }
}

mockall::mock! {
    Consumer {}

    #[async_trait]
    impl ViewConsumer for Consumer {
        async fn on_summary(&self, summary: ClusterSummary) -> Result<()>;
        async fn on_nodes(&self, nodes: Vec<NodeView>) -> Result<()>;
        async fn on_pods(&self, pods: Vec<PodView>) -> Result<()>;
    }
}

/// Cache wired to an offline client: replicas stay empty but readable, so
/// assembly succeeds with empty views.
fn offline_cache() -> Arc<ResourceCache> {
    let config = kube::Config::new("http://127.0.0.1:8080".parse().unwrap());
    let client = kube::Client::try_from(config).expect("offline client");
    Arc::new(ResourceCache::new(&K8sClient::from_client(client, None)))
}

fn scheduler(health: Arc<HealthTracker>, consumer: Arc<MockConsumer>) -> RefreshScheduler {
    RefreshScheduler::new(
        offline_cache(),
        Arc::new(StubSource),
        health,
        Arc::new(MetricsHistory::default()),
        consumer,
        ClusterIdentity::default(),
        RefreshConfig::default(),
    )
}

#[tokio::test]
async fn test_disconnected_tick_suppresses_delivery() {
    let health = Arc::new(HealthTracker::new());
    for _ in 0..3 {
        health.report_error("injected list error");
    }
    assert!(health.is_disconnected());

    let mut consumer = MockConsumer::new();
    // exactly one delivery: the probe tick that restores health must not
    // call back, the tick after it does
    consumer.expect_on_pods().times(1).returning(|_| Ok(()));
    let scheduler = scheduler(health.clone(), Arc::new(consumer));

    // tick k: disconnected at tick start; assembly succeeds, restores
    // health, but delivers nothing
    assert!(!scheduler.refresh_pods_once().await);
    assert!(!health.is_disconnected());

    // tick k+1: connected, delivers
    assert!(scheduler.refresh_pods_once().await);
}

#[tokio::test]
async fn test_connected_ticks_deliver_each_view() {
    let health = Arc::new(HealthTracker::new());
    let mut consumer = MockConsumer::new();
    consumer.expect_on_summary().times(1).returning(|_| Ok(()));
    consumer.expect_on_nodes().times(1).returning(|_| Ok(()));
    consumer.expect_on_pods().times(1).returning(|_| Ok(()));
    let scheduler = scheduler(health, Arc::new(consumer));

    assert!(scheduler.refresh_summary_once().await);
    assert!(scheduler.refresh_nodes_once().await);
    assert!(scheduler.refresh_pods_once().await);
}

#[tokio::test]
async fn test_consumer_errors_are_not_propagated() {
    let health = Arc::new(HealthTracker::new());
    let mut consumer = MockConsumer::new();
    consumer
        .expect_on_pods()
        .times(1)
        .returning(|_| Err(Error::Cancelled));
    let scheduler = scheduler(health.clone(), Arc::new(consumer));

    // delivery happened; the callback error is swallowed and health stays up
    assert!(scheduler.refresh_pods_once().await);
    assert!(!health.is_disconnected());
}

#[tokio::test]
async fn test_successful_cycle_pushes_cluster_history() {
    let health = Arc::new(HealthTracker::new());
    let mut consumer = MockConsumer::new();
    consumer.expect_on_summary().returning(|_| Ok(()));
    let history = Arc::new(MetricsHistory::default());
    let scheduler = RefreshScheduler::new(
        offline_cache(),
        Arc::new(StubSource),
        health,
        history.clone(),
        Arc::new(consumer),
        ClusterIdentity::default(),
        RefreshConfig::default(),
    );

    scheduler.refresh_summary_once().await;
    let snap = history.snapshot(&kubepulse::metrics::EntityKey::Cluster);
    assert_eq!(snap.len(), 1);
    assert!(snap[0].timestamp_unix <= Utc::now().timestamp());
}
