//! swf-daemon - Main Entry Point

use clap::Parser;
use mimalloc::MiMalloc;

use swf_daemon::config::AppConfig;
use swf_daemon::logging::init_tracing;
use swf_daemon::{build_service, sweeper};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "swf-daemon")]
#[command(about = "In-process workflow service with SWF decision/activity semantics")]
#[command(version)]
struct Args {
    /// Config file path (defaults to config/swf-daemon.* when present).
    #[arg(short, long, env = "SWF_DAEMON_CONFIG")]
    config: Option<String>,

    /// Log level, overriding the config file.
    #[arg(long, env = "SWF_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long, env = "SWF_LOG_JSON")]
    json_logs: bool,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.logging.json |= args.json_logs;
    init_tracing(&config.logging);

    if args.check {
        tracing::info!(domains = config.bootstrap.domains.len(), "Configuration is valid");
        return Ok(());
    }

    tracing::info!("Starting swf-daemon v{}", env!("CARGO_PKG_VERSION"));
    let service = build_service(&config)?;

    let total = sweeper::run_sweeper(service, config.engine.sweep_interval(), shutdown_signal()).await;
    tracing::info!(timeouts_applied = total, "Shut down gracefully");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}
