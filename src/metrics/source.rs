//! The uniform metrics interface and its shared entities.
//!
//! Two real variants exist (metrics-aggregator and scrape) plus a null
//! source; a hybrid coordinator layers fallback on top. Callers hold an
//! `Arc<dyn MetricsSource>` and never know which variant answers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::errors::Result;

/// Point-in-time usage for one node. Optional fields are populated only by
/// the scrape source; the aggregator leaves them unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetric {
    pub node: String,
    pub cpu_milli: i64,
    pub mem_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub net_rx_bytes_per_sec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub net_tx_bytes_per_sec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub load1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub load5: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub load15: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pod_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub container_count: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl NodeMetric {
    pub fn zero(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            cpu_milli: 0,
            mem_bytes: 0,
            net_rx_bytes_per_sec: None,
            net_tx_bytes_per_sec: None,
            load1: None,
            load5: None,
            load15: None,
            pod_count: None,
            container_count: None,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerMetric {
    pub name: String,
    pub cpu_milli: i64,
    pub mem_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cpu_throttle_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mem_limit_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub restarts: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetric {
    pub namespace: String,
    pub pod: String,
    pub containers: Vec<ContainerMetric>,
    pub timestamp: DateTime<Utc>,
}

impl PodMetric {
    pub fn total_cpu_milli(&self) -> i64 {
        self.containers.iter().map(|c| c.cpu_milli).sum()
    }

    pub fn total_mem_bytes(&self) -> i64 {
        self.containers.iter().map(|c| c.mem_bytes).sum()
    }

    pub fn container(&self, name: &str) -> Option<&ContainerMetric> {
        self.containers.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    MetricsAggregator,
    Scrape,
    None,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::MetricsAggregator => "metrics-aggregator",
            SourceKind::Scrape => "scrape",
            SourceKind::None => "none",
        }
    }

    /// Short form used inside fallback annotations.
    pub fn short_label(&self) -> &'static str {
        match self {
            SourceKind::MetricsAggregator => "aggregator",
            SourceKind::Scrape => "scrape",
            SourceKind::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    Initializing,
    Collecting,
    Healthy,
    Unhealthy,
}

/// Live status of a source, owned by the source and updated on each
/// collection attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub kind: SourceKind,
    pub state: SourceState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fallback: Option<SourceKind>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_collection: Option<DateTime<Utc>>,
    pub error_count: u64,
    pub available_metrics: Vec<String>,
}

impl SourceInfo {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            state: SourceState::Initializing,
            fallback: None,
            last_collection: None,
            error_count: 0,
            available_metrics: Vec::new(),
        }
    }

    /// Display form of the source type, e.g. "scrape (fallback: aggregator)"
    /// while fallback is active.
    pub fn type_label(&self) -> String {
        match self.fallback {
            Some(fb) => format!("{} (fallback: {})", self.kind.label(), fb.short_label()),
            None => self.kind.label().to_string(),
        }
    }
}

/// Uniform capability set over metric sources. Queries are cancellable by
/// dropping the future; `start` hands the source the session shutdown signal.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn start(&self, shutdown: watch::Receiver<bool>) -> Result<()>;

    fn stop(&self);

    async fn get_node_metrics(&self, node: &str) -> Result<NodeMetric>;

    async fn get_pod_metrics(&self, namespace: &str, pod: &str) -> Result<PodMetric>;

    async fn get_all_pod_metrics(&self) -> Result<Vec<PodMetric>>;

    fn available_metric_names(&self) -> Vec<String>;

    fn is_healthy(&self) -> bool;

    fn source_info(&self) -> SourceInfo;
}

/// The no-metrics source: every query fails with "unavailable".
pub struct NullSource;

#[async_trait]
impl MetricsSource for NullSource {
    async fn start(&self, _shutdown: watch::Receiver<bool>) -> Result<()> {
        Ok(())
    }

    fn stop(&self) {}

    async fn get_node_metrics(&self, _node: &str) -> Result<NodeMetric> {
        Err(crate::errors::Error::MetricsUnavailable(
            "no metrics source configured".to_string(),
        ))
    }

    async fn get_pod_metrics(&self, _namespace: &str, _pod: &str) -> Result<PodMetric> {
        Err(crate::errors::Error::MetricsUnavailable(
            "no metrics source configured".to_string(),
        ))
    }

    async fn get_all_pod_metrics(&self) -> Result<Vec<PodMetric>> {
        Err(crate::errors::Error::MetricsUnavailable(
            "no metrics source configured".to_string(),
        ))
    }

    fn available_metric_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_healthy(&self) -> bool {
        false
    }

    fn source_info(&self) -> SourceInfo {
        SourceInfo {
            state: SourceState::Unhealthy,
            ..SourceInfo::new(SourceKind::None)
        }
    }
}
