use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ratio::config::{LogFormat, LoggingConfig, RatioConfig};
use ratio::grpc::GrpcServer;
use ratio::ratelimit::{store_from_dsn_with, Limit, SlidingWindowLimiter};

/// Sliding-window rate limiting service.
#[derive(Debug, Parser)]
#[command(name = "ratio", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "RATIO_CONFIG")]
    config: Option<PathBuf>,

    /// Address the gRPC server listens on
    #[arg(long)]
    grpc_addr: Option<SocketAddr>,

    /// Window store descriptor (redis://host:port/db or inmemory://)
    #[arg(long)]
    storage: Option<String>,

    /// Limit applied to every owner/resource pair, e.g. 100/minute
    #[arg(long)]
    limit: Option<String>,

    /// Record hits in the background (eventually consistent)
    #[arg(long)]
    async_hits: bool,

    /// Log output format
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    match s.to_ascii_lowercase().as_str() {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(format!("unknown log format {other:?}")),
    }
}

impl Args {
    fn apply(self, config: &mut RatioConfig) -> ratio::error::Result<()> {
        if let Some(addr) = self.grpc_addr {
            config.server.grpc_addr = addr;
        }
        if let Some(storage) = self.storage {
            config.rate_limiting.storage = storage;
        }
        if let Some(limit) = self.limit {
            config.rate_limiting.limit = limit.parse::<Limit>()?;
        }
        if self.async_hits {
            config.rate_limiting.async_hits = true;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        Ok(())
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = RatioConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    args.apply(&mut config).context("invalid command line")?;

    init_tracing(&config.logging);

    info!("Starting Ratio Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        grpc_addr = %config.server.grpc_addr,
        storage = %config.rate_limiting.storage,
        limit = %config.rate_limiting.limit,
        async_hits = config.rate_limiting.async_hits,
        "Configuration loaded"
    );

    let store = store_from_dsn_with(
        &config.rate_limiting.storage,
        config.rate_limiting.store_options(),
    )
    .context("failed to build window store")?;

    let recording = config.rate_limiting.hit_recording();
    let limiter = Arc::new(SlidingWindowLimiter::new(store).with_recording(recording));
    info!(recording = ?recording, "Rate limiter initialized");

    let grpc_server = GrpcServer::new(
        config.server.grpc_addr,
        config.rate_limiting.limit,
        limiter,
    );

    // Run the server with graceful shutdown on Ctrl+C
    grpc_server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Ratio Rate Limiting Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
