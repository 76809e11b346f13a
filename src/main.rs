//! Self-healing proxy
//!
//! ```text
//!     Client Request
//!     ──────────────▶ rate limiter ──▶ load balancer ──▶ backend
//!                        │ 429            │ 503            │ 5xx / error
//!                        ▼                ▼                ▼
//!                     rejected        unavailable    circuit breaker
//!                                                         │ probe 200 OK
//!                                                         ▼
//!                                                  back into the pool
//! ```

use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use self_healing_proxy::config::{load_config, write_default_config};
use self_healing_proxy::lifecycle::{signals, Shutdown};
use self_healing_proxy::observability::{logging, metrics};
use self_healing_proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "self-healing-proxy", version)]
#[command(about = "Rate-limited, least-outstanding reverse proxy with backend quarantine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init { path: PathBuf },
    /// Run the proxy with the given configuration file
    Run { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => {
            write_default_config(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
        Commands::Run { path } => run(&path).await,
    }
}

async fn run(path: &Path) -> Result<(), Box<dyn Error>> {
    let config = load_config(path)?;
    logging::init(&config.observability.log_level);

    tracing::info!("self-healing-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        limit_per_millisecond = config.rate_limit.limit_per_millisecond,
        max_try_count = config.rate_limit.max_try_count,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = ProxyServer::new(config.clone())?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let admin_listener = if config.admin.enabled {
        Some(TcpListener::bind(&config.admin.bind_address).await?)
    } else {
        None
    };

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    server.run(listener, admin_listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
