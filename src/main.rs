use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use throttle::config::ThrottleConfig;
use throttle::http::HttpServer;
use throttle::ratelimit::{spawn_sweeper, RateLimiter};

/// Per-client HTTP rate limiting server.
#[derive(Debug, Parser)]
#[command(name = "throttle", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Requests allowed per client per window
    #[arg(long)]
    rate: Option<u64>,

    /// Window length in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Seconds between sweeps of idle clients
    #[arg(long)]
    cleanup_interval_secs: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn apply(&self, config: &mut ThrottleConfig) {
        if let Some(listen) = self.listen {
            config.server.listen_addr = listen;
        }
        if let Some(rate) = self.rate {
            config.rate_limiting.rate = rate;
        }
        if let Some(window_secs) = self.window_secs {
            config.rate_limiting.window_secs = window_secs;
        }
        if let Some(interval) = self.cleanup_interval_secs {
            config.rate_limiting.cleanup_interval_secs = interval;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ThrottleConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    if args.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if args.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting Throttle rate limiting server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        listen_addr = %config.server.listen_addr,
        rate = config.rate_limiting.rate,
        window_secs = config.rate_limiting.window_secs,
        "Configuration loaded"
    );

    // Initialize the rate limiter and its sweeper
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limiting.rate,
        config.rate_limiting.window(),
    ));
    let sweeper = spawn_sweeper(&rate_limiter, config.rate_limiting.cleanup_interval());
    info!("Rate limiter initialized");

    let server = HttpServer::new(config.server.listen_addr, rate_limiter);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    sweeper.abort();
    info!("Throttle rate limiting server stopped");
    Ok(())
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
