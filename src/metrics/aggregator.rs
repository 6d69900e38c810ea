//! Metrics-aggregator source (metrics.k8s.io, served by metrics-server).
//!
//! Availability is probed by listing server-side API groups. The outcome is
//! cached process-wide: once confirmed available, only every 10th query
//! re-probes; while unavailable, every query re-probes. This keeps a
//! misconfigured cluster from being hot-looped.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;
use tokio::sync::watch;

use crate::errors::{Error, Result};
use crate::k8s::client::K8sClient;
use crate::metrics::source::{
    ContainerMetric, MetricsSource, NodeMetric, PodMetric, SourceInfo, SourceKind, SourceState,
};
use crate::utils::quantity::{parse_cpu_str, parse_memory_str};

const METRICS_GROUP: &str = "metrics.k8s.io";
const BASE_PATH: &str = "/apis/metrics.k8s.io/v1beta1";
/// Queries between availability re-probes once the group is confirmed.
const RECHECK_EVERY: u32 = 10;

struct AvailabilityState {
    available: bool,
    probed: bool,
    queries_since_probe: u32,
}

static AVAILABILITY: OnceLock<RwLock<AvailabilityState>> = OnceLock::new();

fn availability() -> &'static RwLock<AvailabilityState> {
    AVAILABILITY.get_or_init(|| {
        RwLock::new(AvailabilityState {
            available: false,
            probed: false,
            queries_since_probe: 0,
        })
    })
}

pub struct AggregatorSource {
    client: K8sClient,
    info: RwLock<SourceInfo>,
}

impl AggregatorSource {
    pub fn new(client: K8sClient) -> Self {
        Self {
            client,
            info: RwLock::new(SourceInfo::new(SourceKind::MetricsAggregator)),
        }
    }

    async fn probe(&self) -> Result<bool> {
        let groups = self.client.client().list_api_groups().await?;
        let found = groups.groups.iter().any(|g| g.name == METRICS_GROUP);
        debug!("metrics API group probe: available={}", found);
        Ok(found)
    }

    /// Gate a query on the cached availability, re-probing on the cadence
    /// described in the module docs.
    async fn ensure_available(&self) -> Result<()> {
        let needs_probe = {
            let mut state = availability().write().expect("availability lock");
            if !state.probed || !state.available {
                true
            } else {
                state.queries_since_probe += 1;
                if state.queries_since_probe >= RECHECK_EVERY {
                    state.queries_since_probe = 0;
                    true
                } else {
                    false
                }
            }
        };
        if needs_probe {
            let found = self.probe().await?;
            let mut state = availability().write().expect("availability lock");
            state.probed = true;
            state.available = found;
            state.queries_since_probe = 0;
        }
        if availability().read().expect("availability lock").available {
            Ok(())
        } else {
            Err(Error::MetricsUnavailable(format!(
                "{} API group not served",
                METRICS_GROUP
            )))
        }
    }

    fn record_success(&self) {
        let mut info = self.info.write().expect("source info lock");
        info.state = SourceState::Healthy;
        info.last_collection = Some(Utc::now());
    }

    fn record_error(&self) {
        let mut info = self.info.write().expect("source info lock");
        info.state = SourceState::Unhealthy;
        info.error_count += 1;
    }

    fn pods_path(&self) -> String {
        match self.client.namespace() {
            Some(ns) => format!("{}/namespaces/{}/pods", BASE_PATH, ns),
            None => format!("{}/pods", BASE_PATH),
        }
    }
}

#[async_trait]
impl MetricsSource for AggregatorSource {
    async fn start(&self, _shutdown: watch::Receiver<bool>) -> Result<()> {
        {
            let mut info = self.info.write().expect("source info lock");
            info.state = SourceState::Collecting;
        }
        match self.ensure_available().await {
            Ok(()) => {
                self.record_success();
                Ok(())
            }
            Err(e) => {
                self.record_error();
                Err(e)
            }
        }
    }

    fn stop(&self) {}

    async fn get_node_metrics(&self, node: &str) -> Result<NodeMetric> {
        self.ensure_available().await?;
        let path = format!("{}/nodes/{}", BASE_PATH, node);
        let item: NodeMetricsItem = match self.client.get_json(&path).await {
            Ok(item) => item,
            Err(Error::Api(kube::Error::Api(ref resp))) if resp.code == 404 => {
                self.record_error();
                return Err(Error::NotFound {
                    kind: "node metrics".to_string(),
                    name: node.to_string(),
                });
            }
            Err(e) => {
                self.record_error();
                return Err(e);
            }
        };
        self.record_success();
        Ok(item.into_node_metric())
    }

    async fn get_pod_metrics(&self, namespace: &str, pod: &str) -> Result<PodMetric> {
        self.ensure_available().await?;
        let path = format!("{}/namespaces/{}/pods/{}", BASE_PATH, namespace, pod);
        let item: PodMetricsItem = match self.client.get_json(&path).await {
            Ok(item) => item,
            Err(Error::Api(kube::Error::Api(ref resp))) if resp.code == 404 => {
                self.record_error();
                return Err(Error::NotFound {
                    kind: "pod metrics".to_string(),
                    name: format!("{}/{}", namespace, pod),
                });
            }
            Err(e) => {
                self.record_error();
                return Err(e);
            }
        };
        self.record_success();
        Ok(item.into_pod_metric())
    }

    async fn get_all_pod_metrics(&self) -> Result<Vec<PodMetric>> {
        self.ensure_available().await?;
        let list: PodMetricsList = match self.client.get_json(&self.pods_path()).await {
            Ok(list) => list,
            Err(e) => {
                self.record_error();
                return Err(e);
            }
        };
        self.record_success();
        Ok(list
            .items
            .into_iter()
            .map(PodMetricsItem::into_pod_metric)
            .collect())
    }

    fn available_metric_names(&self) -> Vec<String> {
        vec!["cpu".to_string(), "memory".to_string()]
    }

    fn is_healthy(&self) -> bool {
        self.info.read().expect("source info lock").state == SourceState::Healthy
    }

    fn source_info(&self) -> SourceInfo {
        let mut info = self.info.read().expect("source info lock").clone();
        info.available_metrics = self.available_metric_names();
        info
    }
}

// Wire payloads for the aggregated API. No typed Api exists for these.

#[derive(Deserialize)]
struct NodeMetricsItem {
    metadata: MetricsMeta,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    usage: HashMap<String, String>,
}

impl NodeMetricsItem {
    fn into_node_metric(self) -> NodeMetric {
        NodeMetric {
            cpu_milli: self
                .usage
                .get("cpu")
                .and_then(|s| parse_cpu_str(s))
                .unwrap_or(0),
            mem_bytes: self
                .usage
                .get("memory")
                .and_then(|s| parse_memory_str(s))
                .unwrap_or(0),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            ..NodeMetric::zero(self.metadata.name)
        }
    }
}

#[derive(Deserialize)]
struct PodMetricsList {
    items: Vec<PodMetricsItem>,
}

#[derive(Deserialize)]
struct PodMetricsItem {
    metadata: MetricsMeta,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    containers: Vec<ContainerMetricsItem>,
}

impl PodMetricsItem {
    fn into_pod_metric(self) -> PodMetric {
        PodMetric {
            namespace: self.metadata.namespace.unwrap_or_default(),
            pod: self.metadata.name,
            containers: self
                .containers
                .into_iter()
                .map(|c| ContainerMetric {
                    cpu_milli: c.usage.get("cpu").and_then(|s| parse_cpu_str(s)).unwrap_or(0),
                    mem_bytes: c
                        .usage
                        .get("memory")
                        .and_then(|s| parse_memory_str(s))
                        .unwrap_or(0),
                    name: c.name,
                    cpu_throttle_ratio: None,
                    mem_limit_bytes: None,
                    restarts: None,
                })
                .collect(),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Deserialize)]
struct ContainerMetricsItem {
    name: String,
    usage: HashMap<String, String>,
}

#[derive(Deserialize)]
struct MetricsMeta {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
}
