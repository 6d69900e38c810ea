use clap::{Parser, ValueEnum};
use std::str::FromStr;
use std::time::Duration;

/// Lower bound for `--scrape-interval`; tighter loops hammer the API proxy.
pub const MIN_SCRAPE_INTERVAL: Duration = Duration::from_secs(5);
/// Lower bound for `--scrape-retention`.
pub const MIN_SCRAPE_RETENTION: Duration = Duration::from_secs(5 * 60);

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal Kubernetes cluster observability", long_about = None)]
pub struct Args {
    /// Kubernetes config file path. When unset, discovery falls back to
    /// $KUBECONFIG and then ~/.kube/config.
    #[arg(short = 'c', long = "kubeconfig", value_name = "PATH")]
    pub kubeconfig: Option<String>,

    /// Namespace scope. "*" or empty means all namespaces.
    #[arg(short, long, value_name = "NAMESPACE", default_value = "*")]
    pub namespace: String,

    /// Metrics source: aggregator (metrics-server), scrape (API-proxied
    /// /metrics), auto (prefer scrape when healthy), or none.
    #[arg(long = "metrics-source", default_value = "aggregator")]
    pub metrics_source: MetricsSourceArg,

    /// Fall back to the other source when the preferred one errors or is
    /// unhealthy. Ignored for "auto" and "none".
    #[arg(
        long = "metrics-fallback",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_name = "BOOL"
    )]
    pub metrics_fallback: bool,

    /// Scrape round interval (min 5s), e.g. "10s".
    #[arg(long = "scrape-interval", value_name = "DURATION", default_value = "10s")]
    pub scrape_interval: DurationArg,

    /// Scrape sample retention window (min 5m), e.g. "5m".
    #[arg(long = "scrape-retention", value_name = "DURATION", default_value = "5m")]
    pub scrape_retention: DurationArg,

    /// Per-time-series sample cap for the scrape store.
    #[arg(long = "scrape-max-samples", value_name = "N", default_value_t = 500)]
    pub scrape_max_samples: usize,

    /// Comma-separated scrape components (kubelet, cadvisor, apiserver).
    #[arg(long = "scrape-components", value_name = "LIST", default_value = "kubelet,cadvisor")]
    pub scrape_components: String,

    /// Upper bound on one view-model assembly cycle.
    #[arg(long = "refresh-timeout", value_name = "DURATION", default_value = "15s")]
    pub refresh_timeout: DurationArg,

    /// Resync interval for the watch caches (periodic relist reconcile).
    #[arg(long = "resync-interval", value_name = "DURATION", default_value = "5m")]
    pub resync_interval: DurationArg,
}

impl Args {
    /// Namespace scope for list/watch factories: None means all namespaces.
    pub fn namespace_scope(&self) -> Option<String> {
        match self.namespace.trim() {
            "" | "*" => None,
            ns => Some(ns.to_string()),
        }
    }

    pub fn scrape_component_list(&self) -> Vec<String> {
        self.scrape_components
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Floor checks the clap layer cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.scrape_interval.0 < MIN_SCRAPE_INTERVAL {
            return Err(format!(
                "--scrape-interval must be at least {}s",
                MIN_SCRAPE_INTERVAL.as_secs()
            ));
        }
        if self.scrape_retention.0 < MIN_SCRAPE_RETENTION {
            return Err(format!(
                "--scrape-retention must be at least {}m",
                MIN_SCRAPE_RETENTION.as_secs() / 60
            ));
        }
        if self.scrape_max_samples == 0 {
            return Err("--scrape-max-samples must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum MetricsSourceArg {
    Aggregator,
    Scrape,
    Auto,
    None,
}

/// Duration flag accepting "30s", "5m", "1h", or bare seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DurationArg(pub Duration);

impl FromStr for DurationArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration".to_string());
        }
        let (num, mult) = match s.chars().last() {
            Some('s') => (&s[..s.len() - 1], 1u64),
            Some('m') => (&s[..s.len() - 1], 60),
            Some('h') => (&s[..s.len() - 1], 3600),
            Some(c) if c.is_ascii_digit() => (s, 1),
            _ => return Err(format!("unknown duration suffix in '{}'", s)),
        };
        let n: u64 = num
            .parse()
            .map_err(|_| format!("invalid duration '{}'", s))?;
        Ok(DurationArg(Duration::from_secs(n * mult)))
    }
}

impl DurationArg {
    pub fn duration(&self) -> Duration {
        self.0
    }
}
