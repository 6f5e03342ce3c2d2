//! # Aegis Gateway
//!
//! Inline security and routing gateway for LLM backends.
//!
//! Every prompt passes through the guard chain (pattern screening, PII
//! detection), an optional signed-webhook validator, and the provider
//! router before any upstream model sees it.
//!
//! ## Usage
//!
//! ```bash
//! # Start with the default configuration file (config.yaml)
//! aegis-gateway
//!
//! # Start with a custom config file
//! aegis-gateway /path/to/config.yaml
//!
//! # Start with environment overrides
//! AEGIS_PORT=9000 aegis-gateway
//! ```

use aegis_config::GatewayConfig;
use aegis_server::{build_router, AppState};
use aegis_telemetry::init_logging;
use std::env;
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "gateway failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config_path = env::args()
        .nth(1)
        .or_else(|| env::var("AEGIS_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let mut config = if std::path::Path::new(&config_path).exists() {
        GatewayConfig::load(&config_path)?
    } else {
        eprintln!("config file {config_path} not found, using defaults");
        GatewayConfig::default()
    };
    config.apply_env_overrides();
    config.validate()?;

    if let Err(e) = init_logging(&config.logging.level, config.logging.json) {
        eprintln!("failed to initialize logging: {e}");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path,
        "starting Aegis Gateway"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::from_config(config)?);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}
