// Elasticsearch Exporter - Prometheus exporter for Elasticsearch statistics
//
// Reads cluster health, node statistics and optionally Siren Federate and
// snapshot information from an Elasticsearch cluster and serves them as
// gauges in the OpenMetrics text format.
//
// # Features
// - Cluster health, fetched on every scrape of /metrics
// - JVM, thread pool and indexing statistics per node, refreshed on a timer
// - Siren Federate memory and license metrics (--enable-siren)
// - Last snapshot status of one repository (--snapshot-repo)
// - Extra raw node statistics paths (--node-metric)
// - Systemd integration for production deployment
//
// # Usage
// es-exporter --es <url> [--bind <addr>] [--time <seconds>]
//
// Example:
// es-exporter --es "http://localhost:9200" --bind "0.0.0.0:9092" --time 5

use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use es_exporter::collector::DocumentCollector;
use es_exporter::config::{mask_credentials, ExporterConfig};
use es_exporter::exposition::{router, ExporterRegistry};
use es_exporter::metrics::{cluster, jvm, node, siren, snapshot};
use es_exporter::node_stats::{NodeLabel, NodeStatsScraper};
use es_exporter::scheduler::ScrapeScheduler;
use es_exporter::source::{DocumentSource, HttpSource};

/// Application entry point
///
/// This function:
/// 1. Initializes logging
/// 2. Parses and validates the configuration
/// 3. Builds the HTTP source, collectors and scrapers
/// 4. Starts the scrape scheduler in the background
/// 5. Serves /metrics until Ctrl+C
#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("=== Elasticsearch Exporter Starting ===");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ExporterConfig::parse();
    let bind = config.validate().context("Invalid configuration")?;

    info!("Elasticsearch: {}", mask_credentials(&config.es_url));
    info!(
        "Scrape interval: {}s, request timeout: {}s",
        config.interval_secs, config.timeout_secs
    );

    let source: Arc<dyn DocumentSource> = Arc::new(
        HttpSource::new(&config.base_url(), config.timeout(), config.credentials())
            .context("Failed to create HTTP client")?,
    );

    let mut registry = ExporterRegistry::new();

    // Pull-on-demand collectors, fetched on every request
    let cluster_health = DocumentCollector::new(
        "cluster_health",
        cluster::ENDPOINT,
        Arc::clone(&source),
        cluster::liveness(),
    );
    cluster_health
        .add_metrics(cluster::all_metrics().context("Invalid cluster health metric")?)
        .context("Failed to configure cluster health collector")?;
    registry
        .register_collector(Arc::new(cluster_health))
        .context("Failed to register cluster health collector")?;

    if let Some(repository) = &config.snapshot_repo {
        info!("Snapshot metrics enabled for repository '{}'", repository);
        let snapshots = DocumentCollector::new(
            "snapshots",
            snapshot::endpoint(repository),
            Arc::clone(&source),
            snapshot::liveness(),
        );
        snapshots
            .add_metrics(snapshot::all_metrics().context("Invalid snapshot metric")?)
            .context("Failed to configure snapshot collector")?;
        registry
            .register_collector(Arc::new(snapshots))
            .context("Failed to register snapshot collector")?;
    }

    // Timer-driven scrapers
    let mut definitions = jvm::all_metrics().context("Invalid JVM metric")?;
    definitions.extend(node::default_metrics().context("Invalid node metric")?);
    for path in &config.node_metrics {
        definitions.push(
            node::raw_metric(path).with_context(|| format!("Invalid --node-metric '{}'", path))?,
        );
    }

    let mut scrapers = vec![Arc::new(
        NodeStatsScraper::with_definitions(
            "nodes",
            node::ENDPOINT,
            Arc::clone(&source),
            node::liveness(),
            definitions,
            config.node_label,
        )
        .context("Failed to configure node stats scraper")?,
    )];

    if config.enable_siren {
        info!("Siren Federate metrics enabled");
        scrapers.push(Arc::new(
            NodeStatsScraper::with_definitions(
                "siren",
                siren::ENDPOINT,
                Arc::clone(&source),
                siren::liveness(),
                siren::all_metrics().context("Invalid Siren metric")?,
                NodeLabel::Host,
            )
            .context("Failed to configure Siren scraper")?,
        ));
    }

    for scraper in &scrapers {
        registry
            .register_scraper(Arc::clone(scraper))
            .with_context(|| format!("Failed to register scraper '{}'", scraper.name()))?;
    }

    let scheduler = ScrapeScheduler::new(scrapers, config.interval());
    tokio::spawn(scheduler.start());

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    info!("=== Elasticsearch Exporter Started Successfully ===");
    info!("Serving metrics on http://{}/metrics", bind);
    info!("Press Ctrl+C to stop");

    axum::serve(listener, router(Arc::new(registry)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("=== Elasticsearch Exporter Stopped ===");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initializes the logging subsystem
///
/// Sets up structured logging with:
/// - Timestamp, level and target for each log entry
/// - Colored output when running in terminal
/// - JSON output when running as systemd service
///
/// # Log Levels
/// Default: INFO
/// Can be overridden with RUST_LOG environment variable
///
/// # Examples
/// ```bash
/// RUST_LOG=debug es-exporter ...              # Also log skipped metrics
/// RUST_LOG=es_exporter=warn es-exporter ...   # Only warnings and errors
/// ```
fn init_logging() {
    // Systemd sets INVOCATION_ID for the units it starts
    let is_systemd = env::var("INVOCATION_ID").is_ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if is_systemd {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    }
}
