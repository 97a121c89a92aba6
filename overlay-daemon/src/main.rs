//! Overlay Daemon - caption relay and display config hub
//!
//! Connects to the translation source and the control source, and serves
//! overlays/config pages over HTTP + WebSocket on the first free port from
//! the configured one.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};

use overlay_daemon::{bind_with_retry, http, select_address, AppContext, DaemonConfig, ServerInfo};

#[derive(Parser, Debug)]
#[command(name = "overlay-daemon")]
#[command(version)]
#[command(about = "Relay translated captions to overlay clients")]
struct Cli {
    /// Preferred HTTP/WebSocket port
    #[arg(long)]
    port: Option<u16>,

    /// Translation source WebSocket URL
    #[arg(long)]
    upstream_url: Option<String>,

    /// Control source WebSocket URL
    #[arg(long)]
    control_url: Option<String>,

    /// Display config JSON file
    #[arg(long)]
    display_config: Option<PathBuf>,

    /// Daemon settings file (default: platform config dir)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(long)]
    production: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            init_logging(false, cli.verbose);
            error!("Failed to load settings: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(config.production, cli.verbose);
    info!("🌐 Starting Overlay Daemon v{}", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => {
            info!("👋 Overlay Daemon stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<DaemonConfig> {
    let mut config = DaemonConfig::load(cli.settings.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(url) = &cli.upstream_url {
        config.upstream_url = url.clone();
    }
    if let Some(url) = &cli.control_url {
        config.control_url = url.clone();
    }
    if let Some(path) = &cli.display_config {
        config.display_config_path = path.clone();
    }
    if cli.production {
        config.production = true;
    }

    Ok(config)
}

fn init_logging(production: bool, verbose: bool) {
    let level = if production {
        Level::WARN
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(level)
        .init();
}

async fn run(config: DaemonConfig) -> Result<()> {
    let host: IpAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address))?;

    let (listener, port) = bind_with_retry(host, config.port, config.max_port_retries)
        .await
        .context("Could not bind HTTP listener")?;

    let server_info = ServerInfo::new(select_address(), port);
    let ctx = AppContext::new(&config, server_info).await;
    info!("Display config: {:?}", ctx.config_store.path());

    if let Err(e) = ctx.config_store.start_watching().await {
        warn!("Display config file watching disabled: {}", e);
    }
    let forwarder = ctx.spawn_config_forwarder().await;

    let upstream_task = ctx.upstream.start(ctx.shutdown.clone());
    let control_task = ctx.control.start(ctx.shutdown.clone());
    tokio::spawn(wait_for_signal(ctx.shutdown.clone()));

    info!("✓ Overlay server running on port {}", port);
    info!("Overlay URL: {}", ctx.server_info.urls.live);
    info!("Config URL: {}", ctx.server_info.urls.config);

    let shutdown = ctx.shutdown.clone();
    let app = http::router(ctx.clone());
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed");

    // Also reached when serve fails on its own
    ctx.shutdown.cancel();

    info!("🛑 Shutting down...");
    let _ = upstream_task.await;
    let _ = control_task.await;
    ctx.config_store.stop_watching().await;
    ctx.hub.close_all().await;
    forwarder.abort();

    served
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("🛑 Received shutdown signal");
    shutdown.cancel();
}
