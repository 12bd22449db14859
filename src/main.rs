use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tollgate::config::{LogFormat, LoggingConfig, TollgateConfig};
use tollgate::http::{self, AppState};
use tollgate::maintenance::{run_sweeper, LimitsWatcher};
use tollgate::ratelimit::{LimitRegistry, LimitsConfig, RateLimiter, SystemClock};

/// Per-client, per-endpoint HTTP rate limiting.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Cli {
    /// Service configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endpoint limits file, overrides `rate_limiting.config_path`
    #[arg(short, long)]
    limits: Option<PathBuf>,

    /// Address to listen on, overrides `server.http_addr`
    #[arg(long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = TollgateConfig::load(cli.config.as_deref())?;
    if let Some(limits) = cli.limits {
        config.rate_limiting.config_path = Some(limits);
    }
    if let Some(listen) = cli.listen {
        config.server.http_addr = listen;
    }

    init_tracing(&config.logging);

    info!("Starting Tollgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    // Invalid limits abort startup here.
    let limits = match &config.rate_limiting.config_path {
        Some(path) => LimitsConfig::from_file(path)?,
        None => {
            warn!("No endpoint limits file configured, every request uses the fallback limit");
            LimitsConfig::default()
        }
    };
    let registry = LimitRegistry::from_config(&limits)?;
    info!(
        endpoints = registry.len(),
        fallback_capacity = registry.fallback().capacity,
        "Endpoint limits loaded"
    );

    let rate_limiter = Arc::new(RateLimiter::with_capacity(
        registry,
        Arc::new(SystemClock),
        config.rate_limiting.bucket_table_capacity,
    ));
    info!("Rate limiter initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    if let Some(path) = config.rate_limiting.config_path.clone() {
        let watcher = LimitsWatcher::new(path, rate_limiter.clone(), Some(limits));
        tasks.push(tokio::spawn(
            watcher.run(config.rate_limiting.reload_interval(), shutdown_rx.clone()),
        ));
    }

    tasks.push(tokio::spawn(run_sweeper(
        rate_limiter.clone(),
        config.rate_limiting.sweep_interval(),
        config.rate_limiting.idle_ttl(),
        shutdown_rx,
    )));

    let state = AppState::new(rate_limiter, config.rate_limiting.retry_after_secs)
        .with_admin_token(config.server.admin_token.clone());
    if state.admin_enabled() {
        info!("Admin API enabled at /admin/limits");
    } else {
        info!("Admin API disabled: no server.admin_token configured");
    }
    let app = http::router(state);
    let listener = TcpListener::bind(config.server.http_addr).await?;

    info!("Starting HTTP server on {}", config.server.http_addr);

    // Run the server with graceful shutdown on Ctrl+C
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Maintenance task ended abnormally");
        }
    }

    info!("Tollgate stopped");
    Ok(())
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
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
