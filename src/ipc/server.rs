//! IPC Server - Unix socket server for the page host
//!
//! Handles incoming connections and turns each command into a router
//! event dispatched on the current [`Worker`] generation.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::ipc::protocol::{
    parse_command, serialize_response, socket_path, Command, Response, WireHeaders, PROTOCOL_VERSION,
};
use crate::net::RequestDescriptor;
use crate::router::KeepAlive;
use crate::worker::{Event, EventOutcome, Generations, MessageOutcome, Worker};

/// IPC Server that listens for commands from the host
pub struct IpcServer {
    /// Router generations; events go to the current one
    generations: Arc<Generations>,
    socket_path: PathBuf,
    /// Socket listener
    listener: Option<UnixListener>,
    /// Active connections counter
    connection_count: Arc<RwLock<u32>>,
}

impl IpcServer {
    /// Create a new IPC server sharing the host's connection counter
    pub fn new(worker: Arc<Worker>, connection_count: Arc<RwLock<u32>>) -> Self {
        Self {
            generations: Arc::new(Generations::new(worker)),
            socket_path: socket_path(),
            listener: None,
            connection_count,
        }
    }

    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Start the IPC server
    pub async fn start(&mut self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .context("Failed to remove existing socket file")?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .context("Failed to bind Unix socket")?;

        info!(socket_path = %self.socket_path.display(), "IPC server started");

        self.listener = Some(listener);
        Ok(())
    }

    /// Run the server loop, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("Server not started")?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let generations = Arc::clone(&self.generations);
                    let connection_count = Arc::clone(&self.connection_count);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, generations, connection_count).await {
                            error!(error = %e, "Connection handler error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Stop the IPC server and clean up
    pub async fn stop(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).context("Failed to remove socket file")?;
        }
        info!("IPC server stopped");
        Ok(())
    }

    /// Worker currently receiving events
    pub async fn current_worker(&self) -> Arc<Worker> {
        self.generations.current().await
    }

    /// Get the number of active connections
    pub async fn connection_count(&self) -> u32 {
        *self.connection_count.read().await
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: UnixStream,
    generations: Arc<Generations>,
    connection_count: Arc<RwLock<u32>>,
) -> Result<()> {
    {
        let mut count = connection_count.write().await;
        *count += 1;
        debug!(count = *count, "New connection");
    }

    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("Connection closed by client");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                debug!(command = %trimmed, "Received command");

                let (response, keep_alive) = match parse_command(trimmed.as_bytes()) {
                    Ok(command) => process_command(command, &generations).await,
                    Err(e) => {
                        error!(error = %e, command = %trimmed, "Failed to parse command");
                        (Response::error(format!("Invalid command: {}", e)), KeepAlive::new())
                    }
                };

                let written = match serialize_response(&response) {
                    Ok(json) => writer.write_all(&json).await,
                    Err(e) => {
                        error!(error = %e, "Failed to serialize response");
                        Ok(())
                    }
                };

                // Background store writes finish before the next command is read
                keep_alive.settle().await;

                if let Err(e) = written {
                    error!(error = %e, "Failed to write response");
                    break;
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to read from socket");
                break;
            }
        }
    }

    {
        let mut count = connection_count.write().await;
        *count = count.saturating_sub(1);
        debug!(count = *count, "Connection ended");
    }

    Ok(())
}

fn build_request(
    worker: &Worker,
    method: &str,
    url: &str,
    headers: &WireHeaders,
) -> Result<RequestDescriptor> {
    let method = Method::from_bytes(method.as_bytes())
        .with_context(|| format!("Invalid method '{}'", method))?;

    let url = match Url::parse(url) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => worker
            .config()
            .resolve(url)
            .with_context(|| format!("Invalid URL '{}'", url))?,
        Err(e) => return Err(e).with_context(|| format!("Invalid URL '{}'", url)),
    };

    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("Invalid header name '{}'", name))?;
        let value = HeaderValue::from_bytes(value.as_bytes())
            .with_context(|| format!("Invalid value for header '{}'", name))?;
        map.append(name, value);
    }

    Ok(RequestDescriptor::new(method, url).with_headers(map))
}

/// Process a command and return a response plus any background work
async fn process_command(command: Command, generations: &Generations) -> (Response, KeepAlive) {
    let worker = &generations.current().await;
    let response = match command {
        Command::Install => {
            info!("Processing install command");
            match worker.dispatch(Event::Install).settle().await {
                Ok(EventOutcome::Installed(report)) => Response::Success {
                    message: Some(format!(
                        "Installed {} ({} cached, {} failed)",
                        report.store,
                        report.cached.len(),
                        report.failed.len()
                    )),
                },
                Ok(other) => unexpected(other),
                Err(e) => Response::error(format!("Install failed: {}", e)),
            }
        }

        Command::Activate => {
            info!("Processing activate command");
            match worker.dispatch(Event::Activate).settle().await {
                Ok(EventOutcome::Activated(report)) => Response::Success {
                    message: Some(format!(
                        "Activated ({} stores deleted, {} clients claimed)",
                        report.deleted.len(),
                        report.claimed
                    )),
                },
                Ok(other) => unexpected(other),
                Err(e) => Response::error(format!("Activate failed: {}", e)),
            }
        }

        Command::Fetch { method, url, headers } => {
            let request = match build_request(worker, &method, &url, &headers) {
                Ok(request) => request,
                Err(e) => return (Response::error(format!("{:#}", e)), KeepAlive::new()),
            };
            match worker.dispatch(Event::Fetch(request)).settle().await {
                Ok(EventOutcome::Responded(handled)) => {
                    let response = Response::fetched(handled.outcome.source(), handled.outcome.response());
                    return (response, handled.keep_alive);
                }
                Ok(EventOutcome::Declined) => Response::Declined,
                Ok(other) => unexpected(other),
                Err(e) => Response::error(format!("Fetch failed: {}", e)),
            }
        }

        Command::Message { payload } => {
            let (tx, rx) = oneshot::channel();
            let settled = worker
                .dispatch(Event::Message {
                    payload,
                    reply: Some(tx),
                })
                .settle()
                .await;
            // A handler that answered its port has said all the host needs
            if let Ok(reply) = rx.await {
                return (Response::Reply { reply }, KeepAlive::new());
            }
            match settled {
                Ok(EventOutcome::Messaged(MessageOutcome::SkippedWaiting(Some(report)))) => {
                    Response::Success {
                        message: Some(format!(
                            "Activated ({} stores deleted, {} clients claimed)",
                            report.deleted.len(),
                            report.claimed
                        )),
                    }
                }
                Ok(EventOutcome::Messaged(MessageOutcome::SkippedWaiting(None))) => Response::Success {
                    message: Some("Skip-waiting recorded".to_string()),
                },
                Ok(EventOutcome::Messaged(MessageOutcome::Ignored)) => Response::Success {
                    message: Some("Message ignored".to_string()),
                },
                Ok(other) => unexpected(other),
                Err(e) => Response::error(format!("Message failed: {}", e)),
            }
        }

        Command::Sync { tag } => match worker.dispatch(Event::Sync { tag }).settle().await {
            Ok(EventOutcome::Synced(ok)) => Response::Synced { ok },
            Ok(other) => unexpected(other),
            Err(e) => Response::error(format!("Sync failed: {}", e)),
        },

        Command::Push { payload } => match worker.dispatch(Event::Push { payload }).settle().await {
            Ok(_) => Response::Success {
                message: Some("Notification shown".to_string()),
            },
            Err(e) => Response::error(format!("Push failed: {}", e)),
        },

        Command::NotificationClick { tag, action } => {
            match worker
                .dispatch(Event::NotificationClick { tag, action })
                .settle()
                .await
            {
                Ok(EventOutcome::Clicked { opened }) => Response::Success {
                    message: Some(if opened { "Window opened" } else { "Dismissed" }.to_string()),
                },
                Ok(other) => unexpected(other),
                Err(e) => Response::error(format!("Notification click failed: {}", e)),
            }
        }

        Command::Upgrade { version } => {
            info!(version = %version, "Processing upgrade command");
            match generations.upgrade(&version).await {
                Ok(report) => Response::Success {
                    message: Some(format!(
                        "Upgraded {} -> {} ({} cached, {} failed, {} stores deleted)",
                        report.from,
                        report.to,
                        report.install.cached.len(),
                        report.install.failed.len(),
                        report.activate.deleted.len()
                    )),
                },
                Err(e) => Response::error(format!("Upgrade failed: {}", e)),
            }
        }

        Command::GetStatus => {
            debug!("Processing getStatus command");
            match worker.status().await {
                Ok(status) => Response::Status {
                    version: PROTOCOL_VERSION,
                    healthy: true,
                    cache_version: status.version,
                    state: status.state,
                    caches: status.caches,
                },
                Err(e) => Response::error(format!("Status unavailable: {}", e)),
            }
        }
    };

    (response, KeepAlive::new())
}

fn unexpected(outcome: EventOutcome) -> Response {
    warn!(outcome = ?outcome, "Unexpected event outcome");
    Response::error("Unexpected event outcome")
}
