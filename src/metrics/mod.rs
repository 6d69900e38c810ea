pub mod aggregator;
pub mod history;
pub mod hybrid;
pub mod scrape;
pub mod source;

pub use history::{EntityKey, MetricSample, MetricsHistory};
pub use source::{
    ContainerMetric, MetricsSource, NodeMetric, NullSource, PodMetric, SourceInfo, SourceKind,
    SourceState,
};
