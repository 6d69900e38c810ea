use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use colored::Colorize;
use log::info;
use tokio::sync::watch;

use kubepulse::cli::{Args, MetricsSourceArg};
use kubepulse::k8s::auth::AccessGuard;
use kubepulse::k8s::cache::ResourceCache;
use kubepulse::k8s::K8sClient;
use kubepulse::metrics::aggregator::AggregatorSource;
use kubepulse::metrics::hybrid::{HybridSource, Preference};
use kubepulse::metrics::scrape::{ScrapeConfig, ScrapeSource};
use kubepulse::metrics::{MetricsHistory, MetricsSource, NullSource};
use kubepulse::refresh::{HealthTracker, RefreshConfig, RefreshScheduler, ViewConsumer};
use kubepulse::utils::quantity::{format_cpu_milli, format_mem_bytes};
use kubepulse::views::types::{ClusterIdentity, ClusterSummary, NodeView, PodView};

/// Headless consumer: one colored status line per summary refresh. The
/// full-screen UI registers its own consumer through the same trait.
struct ConsoleConsumer;

#[async_trait]
impl ViewConsumer for ConsoleConsumer {
    async fn on_summary(&self, s: ClusterSummary) -> kubepulse::errors::Result<()> {
        println!(
            "{} nodes {}/{}  pods {}/{}  cpu {} ({:.0}%)  mem {} ({:.0}%)",
            "●".bright_green(),
            s.nodes_ready,
            s.nodes_count,
            s.pods_running,
            s.pods_count,
            format_cpu_milli(s.used_cpu_milli).bright_cyan(),
            s.cpu_percent(),
            format_mem_bytes(s.used_mem_bytes).bright_cyan(),
            s.mem_percent(),
        );
        Ok(())
    }

    async fn on_nodes(&self, nodes: Vec<NodeView>) -> kubepulse::errors::Result<()> {
        log::debug!("refreshed {} node views", nodes.len());
        Ok(())
    }

    async fn on_pods(&self, pods: Vec<PodView>) -> kubepulse::errors::Result<()> {
        log::debug!("refreshed {} pod views", pods.len());
        Ok(())
    }

    fn on_error(&self, err: &kubepulse::errors::Error) {
        println!("{} {}", "●".bright_red(), err);
    }

    fn on_reconnect(&self) {
        println!("{} reconnected", "●".bright_green());
    }
}

fn build_source(args: &Args, client: &K8sClient) -> Result<Arc<dyn MetricsSource>> {
    let scrape_config = ScrapeConfig::new(
        args.scrape_interval.duration(),
        args.scrape_retention.duration(),
        args.scrape_max_samples,
        args.scrape_component_list(),
    )?;
    let source: Arc<dyn MetricsSource> = match (args.metrics_source, args.metrics_fallback) {
        (MetricsSourceArg::None, _) => Arc::new(NullSource),
        (MetricsSourceArg::Aggregator, false) => Arc::new(AggregatorSource::new(client.clone())),
        (MetricsSourceArg::Scrape, false) => {
            Arc::new(ScrapeSource::new(client.clone(), scrape_config))
        }
        (preferred, _) => {
            let preference = match preferred {
                MetricsSourceArg::Aggregator => Preference::Aggregator,
                MetricsSourceArg::Scrape => Preference::Scrape,
                _ => Preference::Auto,
            };
            Arc::new(HybridSource::new(
                Arc::new(AggregatorSource::new(client.clone())),
                Arc::new(ScrapeSource::new(client.clone(), scrape_config)),
                preference,
                true,
            ))
        }
    };
    Ok(source)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    if let Err(msg) = args.validate() {
        eprintln!("Error: {}", msg);
        std::process::exit(1);
    }

    println!("{}", "⏱  Kubepulse - Cluster Observability".bright_cyan().bold());
    println!("{}", "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_cyan());
    println!(
        "   Namespace scope: {}",
        args.namespace_scope()
            .unwrap_or_else(|| "all namespaces".to_string())
            .bright_green()
    );
    println!(
        "   Metrics source: {}",
        format!("{:?}", args.metrics_source).to_lowercase().bright_green()
    );
    println!();

    info!("starting kubepulse data plane");

    print!("🔗 Connecting to cluster... ");
    let client = match K8sClient::new(args.kubeconfig.as_deref(), args.namespace_scope()).await {
        Ok(client) => {
            println!("{}", "✅ Success".bright_green());
            client
        }
        Err(e) => {
            println!("{}", "❌ Failed".bright_red());
            eprintln!("Error: {}", e);
            return Err(e.into());
        }
    };

    let identity = ClusterIdentity {
        cluster_name: client.cluster_name().map(str::to_string),
        server_version: client.server_version().await.ok().flatten(),
    };
    if let Some(name) = &identity.cluster_name {
        println!("   Cluster: {}", name.bright_green());
    }
    if let Some(version) = &identity.server_version {
        println!("   Server: {}", version.bright_green());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let guard = AccessGuard::new(client.clone());
    let cache = Arc::new(ResourceCache::new(&client));
    let namespace = args.namespace_scope();
    print!("📡 Syncing resource caches... ");
    match cache
        .start(
            &guard,
            namespace.as_deref(),
            args.resync_interval.duration(),
            shutdown_rx.clone(),
        )
        .await
    {
        Ok(()) => println!("{}", "✅ Ready".bright_green()),
        Err(e) => {
            println!("{}", "❌ Failed".bright_red());
            eprintln!("Error: {}", e);
            return Err(e.into());
        }
    }

    let source = build_source(&args, &client)?;
    if let Err(e) = source.start(shutdown_rx.clone()).await {
        log::warn!("metrics source start: {}", e);
    }

    let scheduler = Arc::new(RefreshScheduler::new(
        cache,
        source,
        Arc::new(HealthTracker::new()),
        Arc::new(MetricsHistory::default()),
        Arc::new(ConsoleConsumer),
        identity,
        RefreshConfig {
            refresh_timeout: args.refresh_timeout.duration(),
            ..RefreshConfig::default()
        },
    ));
    scheduler.start(shutdown_rx);

    println!();
    tokio::signal::ctrl_c().await?;
    let _ = shutdown_tx.send(true);
    println!();
    println!("{}", "👋 Shutting down".bright_cyan());
    Ok(())
}
