//! Periodic view-model refresh loops.
//!
//! One loop per view (summary, nodes, pods), each assembling from the caches
//! and metrics source on its own cadence and delivering through the
//! registered consumer. Delivery is synchronous on the loop's task: a slow
//! consumer stretches the cadence, ticks are never queued. Assembly and
//! callback errors are swallowed here and recorded in the health tracker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::errors::{Error, Result};
use crate::k8s::cache::ResourceCache;
use crate::metrics::{EntityKey, MetricSample, MetricsHistory, MetricsSource};
use crate::refresh::health::{HealthTracker, Transition};
use crate::utils::quantity::ratio;
use crate::views::types::{ClusterIdentity, ClusterSummary, NodeView, PodView};
use crate::views::{build_cluster_summary, build_node_views, build_pod_views};

pub const SUMMARY_INTERVAL: Duration = Duration::from_secs(5);
pub const NODES_INTERVAL: Duration = Duration::from_secs(5);
pub const PODS_INTERVAL: Duration = Duration::from_secs(3);

/// Callbacks the UI registers. View deliveries are async and must return
/// promptly; a consumer that blocks longer than one cadence delays its loop.
#[async_trait]
pub trait ViewConsumer: Send + Sync {
    async fn on_summary(&self, summary: ClusterSummary) -> Result<()>;
    async fn on_nodes(&self, nodes: Vec<NodeView>) -> Result<()>;
    async fn on_pods(&self, pods: Vec<PodView>) -> Result<()>;

    /// Connection is degrading; `err` is the failure that moved the state.
    fn on_error(&self, _err: &Error) {}

    /// Connection restored after degraded/disconnected.
    fn on_reconnect(&self) {}
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub summary_interval: Duration,
    pub nodes_interval: Duration,
    pub pods_interval: Duration,
    /// Upper bound on one assembly cycle; a timeout counts as a failure.
    pub refresh_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            summary_interval: SUMMARY_INTERVAL,
            nodes_interval: NODES_INTERVAL,
            pods_interval: PODS_INTERVAL,
            refresh_timeout: Duration::from_secs(15),
        }
    }
}

pub struct RefreshScheduler {
    cache: Arc<ResourceCache>,
    source: Arc<dyn MetricsSource>,
    health: Arc<HealthTracker>,
    history: Arc<MetricsHistory>,
    consumer: Arc<dyn ViewConsumer>,
    identity: ClusterIdentity,
    config: RefreshConfig,
}

impl RefreshScheduler {
    pub fn new(
        cache: Arc<ResourceCache>,
        source: Arc<dyn MetricsSource>,
        health: Arc<HealthTracker>,
        history: Arc<MetricsHistory>,
        consumer: Arc<dyn ViewConsumer>,
        identity: ClusterIdentity,
        config: RefreshConfig,
    ) -> Self {
        Self {
            cache,
            source,
            health,
            history,
            consumer,
            identity,
            config,
        }
    }

    /// Spawn the three refresh loops. Each assembles immediately, then ticks
    /// at its cadence until the shutdown signal fires.
    pub fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        tokio::spawn(self.clone().summary_loop(shutdown.clone()));
        tokio::spawn(self.clone().nodes_loop(shutdown.clone()));
        tokio::spawn(self.pods_loop(shutdown));
    }

    /// Shared per-tick bookkeeping: run the assembly under the cycle
    /// timeout, route the outcome through the health tracker, and decide
    /// whether this tick may deliver.
    async fn cycle<T>(
        &self,
        view: &str,
        assemble: impl std::future::Future<Output = Result<T>>,
    ) -> Option<(T, bool)> {
        let was_disconnected = self.health.is_disconnected();
        let outcome = match tokio::time::timeout(self.config.refresh_timeout, assemble).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Transient(format!("{} refresh timed out", view))),
        };
        match outcome {
            Ok(value) => {
                if self.health.report_success() == Transition::Reconnected {
                    debug!("{} refresh: reconnected", view);
                    self.consumer.on_reconnect();
                }
                // The cycle that restores health only probes; delivery
                // resumes on the next tick.
                Some((value, !was_disconnected))
            }
            Err(e) => {
                match self.health.report_error(e.to_string()) {
                    Transition::None => {}
                    _ => self.consumer.on_error(&e),
                }
                warn!("{} refresh failed: {}", view, e);
                None
            }
        }
    }

    /// One summary cycle: assemble, record health, push history, deliver.
    /// Returns true when the consumer was invoked.
    pub async fn refresh_summary_once(&self) -> bool {
        let assemble = build_cluster_summary(&self.cache, self.source.as_ref(), &self.identity);
        match self.cycle("summary", assemble).await {
            Some((summary, deliver)) => {
                self.history.push(
                    EntityKey::Cluster,
                    MetricSample {
                        timestamp_unix: Utc::now().timestamp(),
                        cpu_ratio: ratio(summary.used_cpu_milli, summary.allocatable_cpu_milli),
                        mem_ratio: ratio(summary.used_mem_bytes, summary.allocatable_mem_bytes),
                    },
                );
                if deliver {
                    if let Err(e) = self.consumer.on_summary(summary).await {
                        debug!("summary consumer error: {}", e);
                    }
                }
                deliver
            }
            None => false,
        }
    }

    pub async fn refresh_nodes_once(&self) -> bool {
        let assemble = build_node_views(&self.cache, self.source.as_ref());
        match self.cycle("nodes", assemble).await {
            Some((nodes, deliver)) => {
                let now = Utc::now().timestamp();
                for node in &nodes {
                    self.history.push(
                        EntityKey::Node(node.name.clone()),
                        MetricSample {
                            timestamp_unix: now,
                            cpu_ratio: ratio(node.used_cpu_milli, node.allocatable_cpu_milli),
                            mem_ratio: ratio(node.used_mem_bytes, node.allocatable_mem_bytes),
                        },
                    );
                }
                if deliver {
                    if let Err(e) = self.consumer.on_nodes(nodes).await {
                        debug!("nodes consumer error: {}", e);
                    }
                }
                deliver
            }
            None => false,
        }
    }

    pub async fn refresh_pods_once(&self) -> bool {
        let assemble = build_pod_views(&self.cache, self.source.as_ref());
        match self.cycle("pods", assemble).await {
            Some((pods, deliver)) => {
                let now = Utc::now().timestamp();
                for pod in &pods {
                    self.history.push(
                        EntityKey::pod(pod.namespace.clone(), pod.name.clone()),
                        MetricSample {
                            timestamp_unix: now,
                            cpu_ratio: ratio(pod.used_cpu_milli, pod.node_allocatable_cpu_milli),
                            mem_ratio: ratio(pod.used_mem_bytes, pod.node_allocatable_mem_bytes),
                        },
                    );
                }
                // Drop rings for pods that left the cluster.
                let live: std::collections::HashSet<(String, String)> = pods
                    .iter()
                    .map(|p| (p.namespace.clone(), p.name.clone()))
                    .collect();
                self.history.retain(|key| match key {
                    EntityKey::Pod { namespace, name } => {
                        live.contains(&(namespace.clone(), name.clone()))
                    }
                    _ => true,
                });
                if deliver {
                    if let Err(e) = self.consumer.on_pods(pods).await {
                        debug!("pods consumer error: {}", e);
                    }
                }
                deliver
            }
            None => false,
        }
    }

    async fn summary_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.summary_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = ticker.tick() => {}
            }
            self.refresh_summary_once().await;
        }
    }

    async fn nodes_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.nodes_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = ticker.tick() => {}
            }
            self.refresh_nodes_once().await;
        }
    }

    async fn pods_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.pods_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = ticker.tick() => {}
            }
            self.refresh_pods_once().await;
        }
    }
}
