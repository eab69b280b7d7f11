use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use packscan_common::utils::format_duration;
use packscan_node::messaging::{HttpNotifier, LogOnlyNotifier, Notifier};
use packscan_node::utils::metrics::Metrics;
use packscan_node::{ScannerConfig, Station};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/scanner.yaml")]
    config: String,

    /// Log level, overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Exit once every camera source is finished
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let started = Instant::now();

    let config = ScannerConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config))?;

    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level)?;

    info!(node_id = %config.node_id, cameras = config.cameras.len(), "Starting pack scanner");

    let metrics = Arc::new(Metrics::new()?);
    let notifier: Arc<dyn Notifier> = match &config.server.base_url {
        Some(url) => {
            info!(server = %url, "Reporting to line server");
            Arc::new(HttpNotifier::new(url, &config.server)?)
        }
        None => {
            warn!("No server configured, outcomes are only logged");
            Arc::new(LogOnlyNotifier)
        }
    };

    let cancel = CancellationToken::new();
    let station = Station::from_config(&config, notifier, metrics.clone(), cancel.clone())?;

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        shutdown.cancel();
    });

    let report = station.run(args.once).await?;
    info!(
        results = report.results_received,
        with_codes = report.packs_with_codes,
        bad_codes = report.packs_bad_codes,
        task_errors = report.task_errors,
        uptime = %format_duration(started.elapsed()),
        "Pack scanner stopped"
    );

    if config.monitoring.enable_metrics {
        if let Some(path) = &config.monitoring.metrics_dump_path {
            match metrics.render() {
                Ok(text) => {
                    std::fs::write(path, text)
                        .with_context(|| format!("failed to write metrics to {}", path.display()))?;
                    info!("Metrics written to {}", path.display());
                }
                Err(e) => error!("Failed to render metrics: {}", e),
            }
        }
    }

    Ok(())
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_thread_names(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install log subscriber")?;

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
