//! Hybrid coordinator over the aggregator and scrape sources.
//!
//! Selection policy:
//! - `preferred=X, fallback=true`: try X; on error or unhealthy, try the
//!   other and surface that result. `source_info().type_label()` carries a
//!   "(fallback: Y)" annotation while fallback is active.
//! - `preferred=X, fallback=false`: X only, errors surfaced as-is.
//! - `preferred=auto`: scrape when healthy (richer), aggregator otherwise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::errors::Result;
use crate::metrics::aggregator::AggregatorSource;
use crate::metrics::scrape::ScrapeSource;
use crate::metrics::source::{MetricsSource, NodeMetric, PodMetric, SourceInfo, SourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    Aggregator,
    Scrape,
    Auto,
}

pub struct HybridSource {
    aggregator: Arc<AggregatorSource>,
    scrape: Arc<ScrapeSource>,
    preference: Preference,
    fallback_enabled: bool,
    fallback_active: AtomicBool,
}

impl HybridSource {
    pub fn new(
        aggregator: Arc<AggregatorSource>,
        scrape: Arc<ScrapeSource>,
        preference: Preference,
        fallback_enabled: bool,
    ) -> Self {
        Self {
            aggregator,
            scrape,
            preference,
            fallback_enabled,
            fallback_active: AtomicBool::new(false),
        }
    }

    /// Sources in try order for the current policy and health.
    fn order(&self) -> Vec<&dyn MetricsSource> {
        let agg: &dyn MetricsSource = self.aggregator.as_ref();
        let scrape: &dyn MetricsSource = self.scrape.as_ref();
        match self.preference {
            Preference::Auto => {
                if self.scrape.is_healthy() {
                    vec![scrape, agg]
                } else {
                    vec![agg, scrape]
                }
            }
            Preference::Aggregator if self.fallback_enabled => vec![agg, scrape],
            Preference::Aggregator => vec![agg],
            Preference::Scrape if self.fallback_enabled => vec![scrape, agg],
            Preference::Scrape => vec![scrape],
        }
    }

    async fn try_each<'a, T, F, Fut>(&'a self, call: F) -> Result<T>
    where
        F: Fn(&'a dyn MetricsSource) -> Fut,
        Fut: std::future::Future<Output = Result<T>> + 'a,
    {
        let order = self.order();
        let mut last_err = None;
        for (i, source) in order.iter().enumerate() {
            match call(*source).await {
                Ok(value) => {
                    self.fallback_active.store(i > 0, Ordering::Release);
                    return Ok(value);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.expect("order is never empty"))
    }

    fn primary_kind(&self) -> SourceKind {
        match self.preference {
            Preference::Aggregator => SourceKind::MetricsAggregator,
            Preference::Scrape => SourceKind::Scrape,
            Preference::Auto => {
                if self.scrape.is_healthy() {
                    SourceKind::Scrape
                } else {
                    SourceKind::MetricsAggregator
                }
            }
        }
    }

    fn other_kind(kind: SourceKind) -> SourceKind {
        match kind {
            SourceKind::MetricsAggregator => SourceKind::Scrape,
            _ => SourceKind::MetricsAggregator,
        }
    }
}

#[async_trait]
impl MetricsSource for HybridSource {
    async fn start(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        // The scrape loop must run regardless of preference so fallback (or
        // auto promotion) has data to answer from.
        self.scrape.start(shutdown.clone()).await?;
        if let Err(e) = self.aggregator.start(shutdown).await {
            log::warn!("aggregator source unavailable at start: {}", e);
        }
        Ok(())
    }

    fn stop(&self) {
        self.scrape.stop();
        self.aggregator.stop();
    }

    async fn get_node_metrics(&self, node: &str) -> Result<NodeMetric> {
        self.try_each(|s| s.get_node_metrics(node)).await
    }

    async fn get_pod_metrics(&self, namespace: &str, pod: &str) -> Result<PodMetric> {
        self.try_each(|s| s.get_pod_metrics(namespace, pod)).await
    }

    async fn get_all_pod_metrics(&self) -> Result<Vec<PodMetric>> {
        self.try_each(|s| s.get_all_pod_metrics()).await
    }

    fn available_metric_names(&self) -> Vec<String> {
        let mut names = self.aggregator.available_metric_names();
        names.extend(self.scrape.available_metric_names());
        names.sort();
        names.dedup();
        names
    }

    fn is_healthy(&self) -> bool {
        self.aggregator.is_healthy() || self.scrape.is_healthy()
    }

    fn source_info(&self) -> SourceInfo {
        let primary = self.primary_kind();
        let mut info = match primary {
            SourceKind::Scrape => self.scrape.source_info(),
            _ => self.aggregator.source_info(),
        };
        if self.fallback_active.load(Ordering::Acquire) {
            info.fallback = Some(Self::other_kind(primary));
        }
        info.available_metrics = self.available_metric_names();
        info
    }
}
