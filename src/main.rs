//! SwiftSync router daemon
//!
//! Runs the offline router and exposes its events to the page host over a
//! Unix domain socket.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use swiftsync_router::cache::{CacheStorage, MemoryCacheStorage};
use swiftsync_router::host::ClientHost;
use swiftsync_router::ipc::{IpcHost, IpcServer};
use swiftsync_router::net::{Fetcher, HttpFetcher, RequestDescriptor};
use swiftsync_router::worker::{Event, EventOutcome, Worker};
use swiftsync_router::RouterConfig;

/// CLI command
#[derive(Debug)]
enum Command {
    /// Run IPC server mode (default)
    Server,
    /// Route a single GET and print the outcome
    Fetch { url: String },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"SwiftSync Router - offline-capable request router

USAGE:
    swiftsync-router                     # Run IPC server (default)
    swiftsync-router fetch <url>
    swiftsync-router help

COMMANDS:
    (none)  Run IPC server mode (waits for events from the page host)
    fetch   Install, activate and route one GET request (for testing)
    help    Show this help message

EXAMPLES:
    # Run IPC server (default)
    swiftsync-router

    # Route a request against the configured origin
    swiftsync-router fetch /api/grades

ENVIRONMENT:
    SWIFTSYNC_ORIGIN   Origin the router is scoped to (default http://127.0.0.1:8000)
    SWIFTSYNC_SOCKET   IPC socket path (default: user runtime directory)
    RUST_LOG           Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Server);
    }

    match args[1].as_str() {
        "fetch" => {
            if args.len() < 3 {
                return Err(anyhow!("Usage: swiftsync-router fetch <url>"));
            }
            Ok(Command::Fetch {
                url: args[2].clone(),
            })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

fn build_worker(connection_count: Arc<RwLock<u32>>) -> Result<Arc<Worker>> {
    let config = RouterConfig::from_env()?;
    let fetcher = HttpFetcher::new(config.origin.clone())?;
    let host = IpcHost::new(connection_count);

    Ok(Arc::new(Worker::new(
        config,
        Arc::new(fetcher) as Arc<dyn Fetcher>,
        Arc::new(MemoryCacheStorage::new()) as Arc<dyn CacheStorage>,
        Arc::new(host) as Arc<dyn ClientHost>,
    )))
}

/// Install then activate, logging the reports
async fn bring_up(worker: &Arc<Worker>) -> Result<()> {
    match worker.dispatch(Event::Install).settle().await? {
        EventOutcome::Installed(report) => {
            for (asset, reason) in &report.failed {
                error!(asset = %asset, reason = %reason, "Core asset not cached");
            }
            info!(store = %report.store, cached = report.cached.len(), "Install complete");
        }
        other => return Err(anyhow!("Unexpected install outcome: {:?}", other)),
    }

    worker.dispatch(Event::Activate).settle().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let connection_count = Arc::new(RwLock::new(0));

    match command {
        Command::Server => {
            let worker = build_worker(Arc::clone(&connection_count))?;
            info!(
                origin = %worker.config().origin,
                version = %worker.config().version,
                "Starting SwiftSync router in IPC server mode"
            );

            bring_up(&worker).await?;

            let mut ipc_server = IpcServer::new(Arc::clone(&worker), connection_count);
            if let Err(e) = ipc_server.start().await {
                error!(error = %e, "Failed to start IPC server");
                return Err(e);
            }
            let ipc_server = Arc::new(ipc_server);

            info!("Router ready. Waiting for events from the page host...");

            let running = Arc::clone(&ipc_server);
            let ipc_handle = tokio::spawn(async move {
                if let Err(e) = running.run().await {
                    error!(error = %e, "IPC server error");
                }
            });

            tokio::signal::ctrl_c().await?;

            info!("Received shutdown signal, stopping...");
            ipc_handle.abort();
            ipc_server.stop().await?;

            info!("Shutdown complete.");
        }
        Command::Fetch { url } => {
            let worker = build_worker(connection_count)?;
            bring_up(&worker).await?;

            let url = worker
                .config()
                .resolve(&url)
                .with_context(|| format!("Invalid URL '{}'", url))?;
            let request = RequestDescriptor::get(url.clone());

            match worker.dispatch(Event::Fetch(request)).settle().await? {
                EventOutcome::Responded(handled) => {
                    println!(
                        "{} [{}] {} from {}",
                        url,
                        handled.class,
                        handled.outcome.status(),
                        handled.outcome.source()
                    );
                    handled.keep_alive.settle().await;
                }
                EventOutcome::Declined => println!("{} declined", url),
                other => return Err(anyhow!("Unexpected fetch outcome: {:?}", other)),
            }
        }
        Command::Help => {
            print_help();
        }
    }

    Ok(())
}
