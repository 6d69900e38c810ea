//! Scrape-based metrics source.
//!
//! Pulls text-format metric exposition from in-cluster components through
//! the API proxy on a fixed cadence, parses it into a time-indexed store,
//! and answers queries from the most recent samples within retention.
//!
//! Counter-style metrics (CPU seconds, network bytes) are turned into rates
//! from the last two samples of a series, so the first round after startup
//! reports zero rates until a second round lands.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use kube::api::ListParams;
use kube::ResourceExt;
use log::{debug, info, warn};
use tokio::sync::watch;

use crate::cli::{MIN_SCRAPE_INTERVAL, MIN_SCRAPE_RETENTION};
use crate::errors::{Error, Result};
use crate::k8s::client::K8sClient;
use crate::metrics::source::{
    ContainerMetric, MetricsSource, NodeMetric, PodMetric, SourceInfo, SourceKind, SourceState,
};

/// Per-component fetch timeout within one scrape round.
pub const COMPONENT_TIMEOUT: Duration = Duration::from_secs(30);

// Series names the query layer understands. Kubelet /metrics/resource and
// cadvisor cover the required fields; the rest are best-effort optionals.
const NODE_CPU: &str = "node_cpu_usage_seconds_total";
const NODE_MEM: &str = "node_memory_working_set_bytes";
const CONTAINER_CPU: &str = "container_cpu_usage_seconds_total";
const CONTAINER_MEM: &str = "container_memory_working_set_bytes";
const CPU_THROTTLED: &str = "container_cpu_cfs_throttled_periods_total";
const CPU_PERIODS: &str = "container_cpu_cfs_periods_total";
const MEM_LIMIT: &str = "container_spec_memory_limit_bytes";
const NET_RX: &str = "container_network_receive_bytes_total";
const NET_TX: &str = "container_network_transmit_bytes_total";
const RUNNING_PODS: &str = "kubelet_running_pods";
const RUNNING_CONTAINERS: &str = "kubelet_running_containers";
const LOAD1: &str = "node_load1";
const LOAD5: &str = "node_load5";
const LOAD15: &str = "node_load15";

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub interval: Duration,
    pub retention: Duration,
    pub max_samples: usize,
    pub components: Vec<String>,
    pub component_timeout: Duration,
}

impl ScrapeConfig {
    pub fn new(
        interval: Duration,
        retention: Duration,
        max_samples: usize,
        components: Vec<String>,
    ) -> Result<Self> {
        if interval < MIN_SCRAPE_INTERVAL {
            return Err(Error::Config(format!(
                "scrape interval must be at least {}s",
                MIN_SCRAPE_INTERVAL.as_secs()
            )));
        }
        if retention < MIN_SCRAPE_RETENTION {
            return Err(Error::Config(format!(
                "scrape retention must be at least {}m",
                MIN_SCRAPE_RETENTION.as_secs() / 60
            )));
        }
        if max_samples == 0 {
            return Err(Error::Config("scrape sample cap must be positive".into()));
        }
        Ok(Self {
            interval,
            retention,
            max_samples,
            components,
            component_timeout: COMPONENT_TIMEOUT,
        })
    }
}

/// Scrapeable component registry. Per-node components are fetched once per
/// node through the node proxy; apiserver is a single endpoint.
fn component_proxy_suffix(component: &str) -> Option<&'static str> {
    match component {
        "kubelet" => Some("/proxy/metrics/resource"),
        "cadvisor" => Some("/proxy/metrics/cadvisor"),
        "node" => Some("/proxy/metrics"),
        "apiserver" => None,
        _ => None,
    }
}

fn is_known_component(component: &str) -> bool {
    matches!(component, "kubelet" | "cadvisor" | "node" | "apiserver")
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub ts_ms: i64,
    pub value: f64,
}

struct Series {
    labels: BTreeMap<String, String>,
    samples: VecDeque<Sample>,
}

impl Series {
    fn matches(&self, filter: &[(&str, &str)]) -> bool {
        filter
            .iter()
            .all(|(k, v)| self.labels.get(*k).map(String::as_str) == Some(*v))
    }
}

/// Time-indexed sample store with a retention window and per-series cap.
pub struct MetricStore {
    retention_ms: i64,
    max_samples: usize,
    series: HashMap<String, Vec<Series>>,
}

impl MetricStore {
    pub fn new(retention: Duration, max_samples: usize) -> Self {
        Self {
            retention_ms: retention.as_millis() as i64,
            max_samples,
            series: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, labels: BTreeMap<String, String>, sample: Sample) {
        let list = self.series.entry(name.to_string()).or_default();
        let series = match list.iter_mut().find(|s| s.labels == labels) {
            Some(s) => s,
            None => {
                list.push(Series {
                    labels,
                    samples: VecDeque::new(),
                });
                list.last_mut().expect("just pushed")
            }
        };
        // Re-scrapes within a round carry the same timestamp; keep the last.
        if series.samples.back().map(|s| s.ts_ms) == Some(sample.ts_ms) {
            series.samples.pop_back();
        }
        series.samples.push_back(sample);
        while series.samples.len() > self.max_samples {
            series.samples.pop_front();
        }
    }

    /// Drop samples older than retention and series left empty.
    pub fn prune(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.retention_ms;
        for list in self.series.values_mut() {
            for series in list.iter_mut() {
                while series.samples.front().map(|s| s.ts_ms < cutoff) == Some(true) {
                    series.samples.pop_front();
                }
            }
            list.retain(|s| !s.samples.is_empty());
        }
        self.series.retain(|_, list| !list.is_empty());
    }

    fn matching<'a>(&'a self, name: &str, filter: &'a [(&str, &str)]) -> Vec<&'a Series> {
        self.series
            .get(name)
            .map(|list| list.iter().filter(|s| s.matches(filter)).collect())
            .unwrap_or_default()
    }

    /// Most recent sample within retention across matching series.
    pub fn latest(&self, name: &str, filter: &[(&str, &str)], now_ms: i64) -> Option<Sample> {
        let cutoff = now_ms - self.retention_ms;
        self.matching(name, filter)
            .into_iter()
            .filter_map(|s| s.samples.back().copied())
            .filter(|s| s.ts_ms >= cutoff)
            .max_by_key(|s| s.ts_ms)
    }

    /// Sum of each matching series' latest in-retention sample.
    pub fn sum_latest(&self, name: &str, filter: &[(&str, &str)], now_ms: i64) -> Option<f64> {
        let cutoff = now_ms - self.retention_ms;
        let values: Vec<f64> = self
            .matching(name, filter)
            .into_iter()
            .filter_map(|s| s.samples.back())
            .filter(|s| s.ts_ms >= cutoff)
            .map(|s| s.value)
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum())
        }
    }

    /// Per-second rate summed across matching series, from each series' last
    /// two samples. A series with a single sample contributes zero.
    pub fn rate(&self, name: &str, filter: &[(&str, &str)], now_ms: i64) -> Option<f64> {
        let cutoff = now_ms - self.retention_ms;
        let mut found = false;
        let mut total = 0.0;
        for series in self.matching(name, filter) {
            let n = series.samples.len();
            let last = match series.samples.back() {
                Some(s) if s.ts_ms >= cutoff => *s,
                _ => continue,
            };
            found = true;
            if n < 2 {
                continue;
            }
            let prev = series.samples[n - 2];
            let dt = (last.ts_ms - prev.ts_ms) as f64 / 1000.0;
            if dt <= 0.0 {
                continue;
            }
            // Counter reset leaves a negative delta; skip that window.
            let delta = last.value - prev.value;
            if delta >= 0.0 {
                total += delta / dt;
            }
        }
        if found {
            Some(total)
        } else {
            None
        }
    }

    /// Distinct values of `label` across matching series.
    pub fn label_values(
        &self,
        name: &str,
        filter: &[(&str, &str)],
        label: &str,
    ) -> BTreeSet<String> {
        self.matching(name, filter)
            .into_iter()
            .filter_map(|s| s.labels.get(label).cloned())
            .collect()
    }

    /// Distinct (a, b) label pairs across all series of `name`.
    pub fn label_pairs(&self, name: &str, a: &str, b: &str) -> BTreeSet<(String, String)> {
        self.series
            .get(name)
            .map(|list| {
                list.iter()
                    .filter_map(|s| {
                        Some((s.labels.get(a)?.clone(), s.labels.get(b)?.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Parse one exposition line into (name, labels, value, timestamp-ms).
/// Comment and blank lines yield None; malformed lines are skipped.
pub fn parse_exposition_line(
    line: &str,
) -> Option<(String, BTreeMap<String, String>, f64, Option<i64>)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (name, labels, rest) = match line.find('{') {
        Some(open) => {
            let close = find_label_close(&line[open..])? + open;
            let labels = parse_labels(&line[open + 1..close])?;
            (&line[..open], labels, line[close + 1..].trim_start())
        }
        None => {
            let mut parts = line.splitn(2, char::is_whitespace);
            let name = parts.next()?;
            (name, BTreeMap::new(), parts.next().unwrap_or("").trim_start())
        }
    };
    if name.is_empty() {
        return None;
    }
    let mut tokens = rest.split_whitespace();
    let value = parse_value(tokens.next()?)?;
    let ts = tokens.next().and_then(|t| t.parse::<i64>().ok());
    Some((name.to_string(), labels, value, ts))
}

/// Offset of the closing brace, quote-aware (label values may contain '}').
fn find_label_close(s: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '}' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_labels(s: &str) -> Option<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    let mut chars = s.char_indices().peekable();
    loop {
        // skip separators
        while matches!(chars.peek(), Some((_, ',')) | Some((_, ' '))) {
            chars.next();
        }
        let start = match chars.peek() {
            Some((i, _)) => *i,
            None => break,
        };
        let mut eq = None;
        for (i, c) in chars.by_ref() {
            if c == '=' {
                eq = Some(i);
                break;
            }
        }
        let eq = eq?;
        let key = s[start..eq].trim().to_string();
        match chars.next() {
            Some((_, '"')) => {}
            _ => return None,
        }
        let mut value = String::new();
        let mut escaped = false;
        let mut closed = false;
        for (_, c) in chars.by_ref() {
            if escaped {
                match c {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    other => value.push(other),
                }
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '"' => {
                    closed = true;
                    break;
                }
                other => value.push(other),
            }
        }
        if !closed {
            return None;
        }
        labels.insert(key, value);
    }
    Some(labels)
}

fn parse_value(token: &str) -> Option<f64> {
    match token {
        "+Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        t => t.parse().ok(),
    }
}

pub struct ScrapeSource {
    client: K8sClient,
    config: ScrapeConfig,
    store: Arc<RwLock<MetricStore>>,
    info: Arc<RwLock<SourceInfo>>,
    stopped: Arc<AtomicBool>,
}

impl ScrapeSource {
    pub fn new(client: K8sClient, config: ScrapeConfig) -> Self {
        for c in &config.components {
            if !is_known_component(c) {
                warn!("unknown scrape component '{}', ignoring", c);
            }
        }
        let store = MetricStore::new(config.retention, config.max_samples);
        Self {
            client,
            config,
            store: Arc::new(RwLock::new(store)),
            info: Arc::new(RwLock::new(SourceInfo::new(SourceKind::Scrape))),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn node_names(&self) -> Result<Vec<String>> {
        let list = self.client.nodes().list(&ListParams::default()).await?;
        Ok(list.items.iter().map(|n| n.name_any()).collect())
    }

    /// One scrape round: fetch every enabled component concurrently with a
    /// per-component timeout, parse, and store. Returns the failure count.
    async fn round(&self) -> usize {
        let nodes = match self.node_names().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!("scrape round: node list failed: {}", e);
                return 1;
            }
        };

        // (component, path, node label to inject)
        let mut targets: Vec<(String, String, Option<String>)> = Vec::new();
        for component in &self.config.components {
            if component == "apiserver" {
                targets.push((component.clone(), "/metrics".to_string(), None));
                continue;
            }
            if let Some(suffix) = component_proxy_suffix(component) {
                for node in &nodes {
                    targets.push((
                        component.clone(),
                        format!("/api/v1/nodes/{}{}", node, suffix),
                        Some(node.clone()),
                    ));
                }
            }
        }

        let fetches = targets.iter().map(|(component, path, node)| {
            let client = self.client.clone();
            let timeout = self.config.component_timeout;
            async move {
                let body = tokio::time::timeout(timeout, client.get_text(path))
                    .await
                    .map_err(|_| Error::Transient(format!("{} scrape timed out", component)))
                    .and_then(|r| r);
                (component.clone(), node.clone(), body)
            }
        });

        let now_ms = Utc::now().timestamp_millis();
        let mut failures = 0usize;
        for (component, node, body) in join_all(fetches).await {
            match body {
                Ok(text) => {
                    let mut store = self.store.write().expect("metric store lock");
                    let mut count = 0usize;
                    for line in text.lines() {
                        if let Some((name, mut labels, value, ts)) = parse_exposition_line(line) {
                            if let Some(node) = &node {
                                labels
                                    .entry("node".to_string())
                                    .or_insert_with(|| node.clone());
                            }
                            store.insert(
                                &name,
                                labels,
                                Sample {
                                    ts_ms: ts.unwrap_or(now_ms),
                                    value,
                                },
                            );
                            count += 1;
                        }
                    }
                    debug!("scraped {} samples from {}", count, component);
                }
                Err(e) => {
                    warn!("scrape of {} failed: {}", component, e);
                    failures += 1;
                }
            }
        }
        self.store
            .write()
            .expect("metric store lock")
            .prune(now_ms);
        failures
    }

    fn record_round(&self, failures: usize) {
        let mut info = self.info.write().expect("source info lock");
        info.last_collection = Some(Utc::now());
        if failures > 0 {
            info.error_count += failures as u64;
            info.state = SourceState::Unhealthy;
        } else {
            info.state = SourceState::Healthy;
        }
    }

    fn require_healthy(&self) -> Result<()> {
        let state = self.info.read().expect("source info lock").state;
        match state {
            SourceState::Healthy => Ok(()),
            SourceState::Initializing | SourceState::Collecting => Err(Error::SourceUnhealthy(
                "scrape source still collecting".to_string(),
            )),
            SourceState::Unhealthy => Err(Error::SourceUnhealthy(
                "scrape source failed its last round".to_string(),
            )),
        }
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn build_pod_metric(
        &self,
        store: &MetricStore,
        namespace: &str,
        pod: &str,
        now_ms: i64,
    ) -> PodMetric {
        let filter = [("namespace", namespace), ("pod", pod)];
        let mut names = store.label_values(CONTAINER_CPU, &filter, "container");
        names.extend(store.label_values(CONTAINER_MEM, &filter, "container"));
        // cadvisor emits pod-sandbox series under "" and "POD"
        names.retain(|n| !n.is_empty() && n != "POD");

        let containers = names
            .into_iter()
            .map(|name| {
                let cfilter = [
                    ("namespace", namespace),
                    ("pod", pod),
                    ("container", name.as_str()),
                ];
                let cpu_milli = store
                    .rate(CONTAINER_CPU, &cfilter, now_ms)
                    .map(|r| (r * 1000.0) as i64)
                    .unwrap_or(0);
                let mem_bytes = store
                    .latest(CONTAINER_MEM, &cfilter, now_ms)
                    .map(|s| s.value as i64)
                    .unwrap_or(0);
                let throttled = store.rate(CPU_THROTTLED, &cfilter, now_ms);
                let periods = store.rate(CPU_PERIODS, &cfilter, now_ms);
                let cpu_throttle_ratio = match (throttled, periods) {
                    (Some(t), Some(p)) if p > 0.0 => Some((t / p).clamp(0.0, 1.0)),
                    _ => None,
                };
                let mem_limit_bytes = store
                    .latest(MEM_LIMIT, &cfilter, now_ms)
                    .map(|s| s.value as i64)
                    .filter(|v| *v > 0);
                ContainerMetric {
                    name,
                    cpu_milli,
                    mem_bytes,
                    cpu_throttle_ratio,
                    mem_limit_bytes,
                    restarts: None,
                }
            })
            .collect();

        PodMetric {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            containers,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl MetricsSource for ScrapeSource {
    async fn start(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        {
            let mut info = self.info.write().expect("source info lock");
            info.state = SourceState::Collecting;
        }
        let this = ScrapeSource {
            client: self.client.clone(),
            config: self.config.clone(),
            store: self.store.clone(),
            info: self.info.clone(),
            stopped: self.stopped.clone(),
        };
        info!(
            "scrape source started: components={:?} interval={:?}",
            this.config.components, this.config.interval
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.interval);
            // A round still running at the next tick drops that tick
            // entirely instead of overlapping.
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }
                if this.stopped.load(Ordering::Acquire) {
                    break;
                }
                let failures = this.round().await;
                this.record_round(failures);
            }
            debug!("scrape loop stopped");
        });
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    async fn get_node_metrics(&self, node: &str) -> Result<NodeMetric> {
        self.require_healthy()?;
        let now_ms = Self::now_ms();
        let store = self.store.read().expect("metric store lock");
        let filter = [("node", node)];

        let cpu = store.rate(NODE_CPU, &filter, now_ms);
        let mem = store.latest(NODE_MEM, &filter, now_ms);
        if cpu.is_none() && mem.is_none() {
            return Err(Error::NotFound {
                kind: "node metrics".to_string(),
                name: node.to_string(),
            });
        }

        Ok(NodeMetric {
            node: node.to_string(),
            cpu_milli: cpu.map(|r| (r * 1000.0) as i64).unwrap_or(0),
            mem_bytes: mem.map(|s| s.value as i64).unwrap_or(0),
            net_rx_bytes_per_sec: store.rate(NET_RX, &filter, now_ms).map(|r| r as i64),
            net_tx_bytes_per_sec: store.rate(NET_TX, &filter, now_ms).map(|r| r as i64),
            load1: store.latest(LOAD1, &filter, now_ms).map(|s| s.value),
            load5: store.latest(LOAD5, &filter, now_ms).map(|s| s.value),
            load15: store.latest(LOAD15, &filter, now_ms).map(|s| s.value),
            pod_count: store
                .latest(RUNNING_PODS, &filter, now_ms)
                .map(|s| s.value as i64),
            container_count: store
                .sum_latest(RUNNING_CONTAINERS, &filter, now_ms)
                .map(|v| v as i64),
            timestamp: Utc::now(),
        })
    }

    async fn get_pod_metrics(&self, namespace: &str, pod: &str) -> Result<PodMetric> {
        self.require_healthy()?;
        let now_ms = Self::now_ms();
        let store = self.store.read().expect("metric store lock");
        let metric = self.build_pod_metric(&store, namespace, pod, now_ms);
        if metric.containers.is_empty() {
            return Err(Error::NotFound {
                kind: "pod metrics".to_string(),
                name: format!("{}/{}", namespace, pod),
            });
        }
        Ok(metric)
    }

    async fn get_all_pod_metrics(&self) -> Result<Vec<PodMetric>> {
        self.require_healthy()?;
        let now_ms = Self::now_ms();
        let store = self.store.read().expect("metric store lock");
        let mut pairs = store.label_pairs(CONTAINER_CPU, "namespace", "pod");
        pairs.extend(store.label_pairs(CONTAINER_MEM, "namespace", "pod"));
        if let Some(scope) = self.client.namespace() {
            pairs.retain(|(ns, _)| ns == scope);
        }
        Ok(pairs
            .into_iter()
            .map(|(ns, pod)| self.build_pod_metric(&store, &ns, &pod, now_ms))
            .collect())
    }

    fn available_metric_names(&self) -> Vec<String> {
        self.store.read().expect("metric store lock").metric_names()
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
