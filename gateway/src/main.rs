use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use netrum_gateway::api::{self, AppState};
use netrum_gateway::{Gateway, GatewayConfig};

#[derive(Parser, Debug)]
#[command(name = "netrum-gateway")]
#[command(about = "Caching and aggregation gateway for the Netrum dashboard", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address for HTTP server
    #[arg(long, env = "GATEWAY_BIND")]
    bind: Option<String>,

    /// Node registry base URL
    #[arg(long, env = "NETRUM_API_URL")]
    registry_url: Option<String>,

    /// Block explorer API key
    #[arg(long, env = "EXPLORER_API_KEY", hide_env_values = true)]
    explorer_api_key: Option<String>,

    /// Token required by the cache admin routes
    #[arg(long, env = "GATEWAY_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Netrum dashboard gateway");

    // Load configuration, then apply command-line overrides
    let mut config = GatewayConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(url) = args.registry_url {
        config.registry.base_url = url;
    }
    if let Some(key) = args.explorer_api_key {
        config.explorer.api_key = Some(key);
    }
    if let Some(token) = args.admin_token {
        config.admin_token = Some(token);
    }
    config.validate()?;

    let addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.bind))?;

    let gateway = Arc::new(Gateway::new(config).context("Failed to initialize gateway")?);

    // Start background drivers
    let cancel = CancellationToken::new();
    let drivers = gateway.start(&cancel);

    let app = api::create_router(Arc::new(AppState {
        gateway: gateway.clone(),
    }));

    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
            shutdown.cancel();
        })
        .await
        .context("HTTP server failed")?;

    cancel.cancel();
    for driver in drivers {
        if let Err(e) = driver.await {
            error!("Background task failed: {}", e);
        }
    }

    info!("Gateway stopped");
    Ok(())
}
