//! Worker: the event-facing side of the router
//!
//! Each inbound event is looked up in an explicit handler table and run as
//! its own task. The returned [`EventTask`] is the host's keep-alive handle:
//! the worker must not be torn down until it settles.

pub mod events;
pub mod generations;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

pub use events::{
    ClientMessage, ClientReply, Event, EventName, EventOutcome, EventTask, MessageOutcome,
    ReplyPort, WorkerStatus,
};
pub use generations::{Generations, UpgradeReport};

use crate::cache::CacheStorage;
use crate::config::RouterConfig;
use crate::error::RouterError;
use crate::host::ClientHost;
use crate::lifecycle::{LifecycleController, WorkerState};
use crate::net::{Fetcher, RequestDescriptor};
use crate::notify;
use crate::router::Router;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<EventOutcome, RouterError>> + Send>>;
type Handler = fn(Arc<Worker>, Event) -> HandlerFuture;

/// Handler table keyed by event name
const HANDLERS: [(EventName, Handler); 7] = [
    (EventName::Install, on_install as Handler),
    (EventName::Activate, on_activate as Handler),
    (EventName::Fetch, on_fetch as Handler),
    (EventName::Message, on_message as Handler),
    (EventName::Sync, on_sync as Handler),
    (EventName::Push, on_push as Handler),
    (EventName::NotificationClick, on_notification_click as Handler),
];

fn handler_for(name: EventName) -> Option<Handler> {
    HANDLERS.iter().find(|(n, _)| *n == name).map(|(_, h)| *h)
}

fn on_install(worker: Arc<Worker>, _event: Event) -> HandlerFuture {
    Box::pin(async move { worker.install().await })
}

fn on_activate(worker: Arc<Worker>, _event: Event) -> HandlerFuture {
    Box::pin(async move { worker.activate().await })
}

fn on_fetch(worker: Arc<Worker>, event: Event) -> HandlerFuture {
    Box::pin(async move {
        match event {
            Event::Fetch(request) => worker.fetch(&request).await,
            other => Err(RouterError::NoHandler(other.name())),
        }
    })
}

fn on_message(worker: Arc<Worker>, event: Event) -> HandlerFuture {
    Box::pin(async move {
        match event {
            Event::Message { payload, reply } => worker.message(&payload, reply).await,
            other => Err(RouterError::NoHandler(other.name())),
        }
    })
}

fn on_sync(worker: Arc<Worker>, event: Event) -> HandlerFuture {
    Box::pin(async move {
        match event {
            Event::Sync { tag } => Ok(worker.sync(&tag).await),
            other => Err(RouterError::NoHandler(other.name())),
        }
    })
}

fn on_push(worker: Arc<Worker>, event: Event) -> HandlerFuture {
    Box::pin(async move {
        match event {
            Event::Push { payload } => worker.push(payload.as_deref()).await,
            other => Err(RouterError::NoHandler(other.name())),
        }
    })
}

fn on_notification_click(worker: Arc<Worker>, event: Event) -> HandlerFuture {
    Box::pin(async move {
        match event {
            Event::NotificationClick { tag, action } => {
                worker.notification_click(&tag, action.as_deref()).await
            }
            other => Err(RouterError::NoHandler(other.name())),
        }
    })
}

/// One generation of the router and its collaborators
pub struct Worker {
    config: Arc<RouterConfig>,
    router: Router,
    lifecycle: LifecycleController,
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn CacheStorage>,
    host: Arc<dyn ClientHost>,
}

impl Worker {
    pub fn new(
        config: RouterConfig,
        fetcher: Arc<dyn Fetcher>,
        storage: Arc<dyn CacheStorage>,
        host: Arc<dyn ClientHost>,
    ) -> Self {
        let config = Arc::new(config);
        let router = Router::new(Arc::clone(&config), Arc::clone(&fetcher), Arc::clone(&storage));
        let lifecycle = LifecycleController::new(
            Arc::clone(&config),
            Arc::clone(&fetcher),
            Arc::clone(&storage),
            Arc::clone(&host),
        );
        Self {
            config,
            router,
            lifecycle,
            fetcher,
            storage,
            host,
        }
    }

    /// Next generation for `version`, sharing this one's fetcher, storage and host
    ///
    /// The successor starts with this worker recorded as its predecessor.
    pub fn successor(&self, version: impl Into<String>) -> Worker {
        let config = (*self.config).clone().with_version(version);
        let mut next = Worker::new(
            config,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.storage),
            Arc::clone(&self.host),
        );
        next.lifecycle = next.lifecycle.with_predecessor();
        next
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    /// Run the handler for an event as its own task
    pub fn dispatch(self: &Arc<Self>, event: Event) -> EventTask {
        let name = event.name();
        debug!(event = %name, "Dispatching event");

        let handle = match handler_for(name) {
            Some(handler) => tokio::spawn(handler(Arc::clone(self), event)),
            None => tokio::spawn(async move { Err(RouterError::NoHandler(name)) }),
        };
        EventTask::new(name, handle)
    }

    pub async fn install(&self) -> Result<EventOutcome, RouterError> {
        let report = self.lifecycle.install().await?;
        Ok(EventOutcome::Installed(report))
    }

    pub async fn activate(&self) -> Result<EventOutcome, RouterError> {
        let report = self.lifecycle.activate().await?;
        Ok(EventOutcome::Activated(report))
    }

    /// Route a request; only an active worker handles fetches
    pub async fn fetch(&self, request: &RequestDescriptor) -> Result<EventOutcome, RouterError> {
        let state = self.lifecycle.state().await;
        if state != WorkerState::Active {
            debug!(url = %request.url(), state = %state, "Not active, declining fetch");
            return Ok(EventOutcome::Declined);
        }

        match self.router.route(request).await? {
            Some(handled) => Ok(EventOutcome::Responded(handled)),
            None => Ok(EventOutcome::Declined),
        }
    }

    /// Handle a client message, replying on the channel when one is given
    pub async fn message(
        &self,
        payload: &serde_json::Value,
        reply: Option<ReplyPort>,
    ) -> Result<EventOutcome, RouterError> {
        let Some(message) = ClientMessage::from_payload(payload) else {
            debug!(payload = %payload, "Ignoring unrecognized message");
            return Ok(EventOutcome::Messaged(MessageOutcome::Ignored));
        };

        match message {
            ClientMessage::SkipWaiting => {
                let report = self.lifecycle.skip_waiting().await?;
                Ok(EventOutcome::Messaged(MessageOutcome::SkippedWaiting(report)))
            }
            ClientMessage::ClearCache => {
                let result = self.lifecycle.clear_caches().await;
                let answer = match &result {
                    Ok(_) => ClientReply::success(),
                    Err(e) => ClientReply::failure(e.to_string()),
                };
                match reply {
                    Some(port) => {
                        if port.send(answer).is_err() {
                            warn!("Clear-cache reply channel closed before reply");
                        }
                    }
                    None => debug!("Clear-cache message had no reply channel"),
                }
                let deleted = result?;
                Ok(EventOutcome::Messaged(MessageOutcome::Cleared(deleted)))
            }
        }
    }

    /// Handle a background sync tag
    pub async fn sync(&self, tag: &str) -> EventOutcome {
        info!(tag = tag, "Background sync");
        if tag != self.config.sync_tag {
            debug!(tag = tag, "No sync registered for tag");
            return EventOutcome::Synced(None);
        }
        EventOutcome::Synced(Some(notify::sync_now(self.fetcher.as_ref(), &self.config).await))
    }

    pub async fn push(&self, payload: Option<&str>) -> Result<EventOutcome, RouterError> {
        notify::show_push(self.host.as_ref(), &self.config, payload).await?;
        Ok(EventOutcome::Notified)
    }

    pub async fn notification_click(
        &self,
        tag: &str,
        action: Option<&str>,
    ) -> Result<EventOutcome, RouterError> {
        let opened = notify::handle_click(self.host.as_ref(), &self.config, tag, action).await?;
        Ok(EventOutcome::Clicked { opened })
    }

    pub async fn status(&self) -> Result<WorkerStatus, RouterError> {
        Ok(WorkerStatus {
            version: self.config.version.clone(),
            state: self.lifecycle.state().await,
            caches: self.storage.list_all().await?,
        })
    }
}
