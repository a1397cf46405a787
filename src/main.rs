//! Conditional metadata reverse proxy.
//!
//! ```text
//! client ──▶ conditional-meta ──▶ upstream
//!        ◀── (merged JSON when ?include=meta) ◀──
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use conditional_meta::config::{load_config, AppConfig};
use conditional_meta::observability::{logging, metrics};
use conditional_meta::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "conditional-meta")]
#[command(about = "Reverse proxy that merges metadata into JSON responses on demand", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted.
    #[arg(short, long, env = "CONDITIONAL_META_CONFIG")]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,

    /// Override `upstream.address`.
    #[arg(long)]
    upstream: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(upstream) = cli.upstream {
        config.upstream.address = upstream;
    }

    logging::init(&config.observability.log_level);
    tracing::info!("conditional-meta v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        query_param = %config.middleware.config.query_param,
        query_value = %config.middleware.config.query_value,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let _signals = shutdown.trigger_on_signal();
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
