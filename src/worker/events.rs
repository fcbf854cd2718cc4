//! Inbound events and their outcomes

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::RouterError;
use crate::lifecycle::{ActivateReport, InstallReport, WorkerState};
use crate::net::RequestDescriptor;
use crate::router::Handled;

/// Event names the host can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Install,
    Activate,
    Fetch,
    Message,
    Sync,
    Push,
    NotificationClick,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Install => "install",
            EventName::Activate => "activate",
            EventName::Fetch => "fetch",
            EventName::Message => "message",
            EventName::Sync => "sync",
            EventName::Push => "push",
            EventName::NotificationClick => "notificationclick",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control messages posted by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    SkipWaiting,
    ClearCache,
}

impl ClientMessage {
    /// Recognize a message payload; anything else is ignored
    pub fn from_payload(payload: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }
}

/// Reply sent back on a message's reply channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClientReply {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Reply channel attached to a message
pub type ReplyPort = oneshot::Sender<ClientReply>;

/// An event delivered by the host
#[derive(Debug)]
pub enum Event {
    Install,
    Activate,
    Fetch(RequestDescriptor),
    Message {
        payload: serde_json::Value,
        reply: Option<ReplyPort>,
    },
    Sync {
        tag: String,
    },
    Push {
        payload: Option<String>,
    },
    NotificationClick {
        tag: String,
        action: Option<String>,
    },
}

impl Event {
    pub fn name(&self) -> EventName {
        match self {
            Event::Install => EventName::Install,
            Event::Activate => EventName::Activate,
            Event::Fetch(_) => EventName::Fetch,
            Event::Message { .. } => EventName::Message,
            Event::Sync { .. } => EventName::Sync,
            Event::Push { .. } => EventName::Push,
            Event::NotificationClick { .. } => EventName::NotificationClick,
        }
    }
}

/// What a handled message did
#[derive(Debug)]
pub enum MessageOutcome {
    /// Skip-waiting recorded; carries the activation if it happened
    SkippedWaiting(Option<ActivateReport>),
    /// Stores deleted by a clear-cache command
    Cleared(Vec<String>),
    /// Payload was not a recognized command
    Ignored,
}

/// Result of a settled event task
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    /// The router answered a fetch
    Responded(Handled),
    /// The router declined a fetch; the platform default applies
    Declined,
    Messaged(MessageOutcome),
    /// Sync result; `None` for tags this router does not handle
    Synced(Option<bool>),
    Notified,
    Clicked { opened: bool },
}

/// Snapshot of the worker for status reporting
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub version: String,
    pub state: WorkerState,
    pub caches: Vec<String>,
}

/// Pending handler the host must keep the worker alive for
#[derive(Debug)]
pub struct EventTask {
    name: EventName,
    handle: JoinHandle<Result<EventOutcome, RouterError>>,
}

impl EventTask {
    pub(crate) fn new(name: EventName, handle: JoinHandle<Result<EventOutcome, RouterError>>) -> Self {
        Self { name, handle }
    }

    pub fn name(&self) -> EventName {
        self.name
    }

    /// Wait for the handler to finish
    pub async fn settle(self) -> Result<EventOutcome, RouterError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(RouterError::TaskFailed {
                event: self.name,
                reason: e.to_string(),
            }),
        }
    }
}
