use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::{LoggingConfig, TurnstileConfig};
use turnstile::grpc::GrpcServer;
use turnstile::limiter::{spawn_sweeper, GuardRegistry};

/// Attempt budget rate limiting service.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a YAML or TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address for the gRPC server, overriding the configuration
    #[arg(long)]
    grpc_addr: Option<SocketAddr>,

    /// Log filter directive. Takes precedence over `RUST_LOG`, which in
    /// turn takes precedence over `logging.level` in the configuration
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.grpc_addr {
        config.server.grpc_addr = addr;
    }
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = log_directive(
        args.log_level.as_deref(),
        rust_log.as_deref(),
        &config.logging.level,
    );
    config.logging.level = directive.to_string();
    if args.json_logs {
        config.logging.json = true;
    }

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    init_tracing(&config.logging)?;

    info!("Starting Turnstile Attempt Guard Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        grpc_addr = %config.server.grpc_addr,
        guards = config.guards.len(),
        "Configuration loaded"
    );

    let registry = Arc::new(GuardRegistry::from_config(&config.guards)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = config
        .sweeper
        .interval()
        .map(|interval| spawn_sweeper(Arc::clone(&registry), interval, shutdown_rx));

    let grpc_server = GrpcServer::new(config.server.grpc_addr, registry);

    grpc_server.serve_with_shutdown(shutdown_signal()).await?;

    let _ = shutdown_tx.send(true);
    if let Some(sweeper) = sweeper {
        sweeper.await?;
    }

    info!("Turnstile Attempt Guard Service stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&logging.level)?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

/// Pick the log filter: the `--log-level` flag, then `RUST_LOG`, then the
/// configured level. Blank values are skipped.
fn log_directive<'a>(
    flag: Option<&'a str>,
    rust_log: Option<&'a str>,
    configured: &'a str,
) -> &'a str {
    [flag, rust_log]
        .into_iter()
        .flatten()
        .find(|directive| !directive.trim().is_empty())
        .unwrap_or(configured)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_flag_beats_rust_log() {
        assert_eq!(log_directive(Some("debug"), Some("warn"), "info"), "debug");
    }

    #[test]
    fn test_rust_log_beats_configured_level() {
        assert_eq!(log_directive(None, Some("warn"), "info"), "warn");
    }

    #[test]
    fn test_configured_level_is_fallback() {
        assert_eq!(log_directive(None, None, "turnstile=trace"), "turnstile=trace");
        assert_eq!(log_directive(Some(" "), Some(""), "info"), "info");
    }
}
