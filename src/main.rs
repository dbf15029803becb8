use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use marquee::config::MarqueeConfig;
use marquee::ratelimit::RateLimiter;
use marquee::web::{AppState, HttpServer};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "marquee", version, about = "Rate-limited form endpoints for the marketing site")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Marquee");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = MarqueeConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    let (contact_policy, quote_policy) = config.policies()?;
    info!(
        http_addr = %config.server.http_addr,
        contact_max = contact_policy.max_requests(),
        quote_max = quote_policy.max_requests(),
        "Configuration loaded"
    );

    let rate_limiter = Arc::new(RateLimiter::new());
    info!("Rate limiter initialized");

    // The limiter has no timer of its own; sweep it on our schedule
    let sweeper = {
        let rate_limiter = rate_limiter.clone();
        let period = config.rate_limiting.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let removed = rate_limiter.sweep_expired(Instant::now());
                debug!(removed, live = rate_limiter.counter_count(), "Rate limit sweep complete");
            }
        })
    };

    let state = AppState {
        rate_limiter,
        contact_policy,
        quote_policy,
    };
    let server = HttpServer::new(config.server.http_addr, state);

    server.serve_with_shutdown(shutdown_signal()).await?;

    sweeper.abort();
    info!("Marquee stopped");
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
