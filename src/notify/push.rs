//! Push notification payloads
//!
//! Builds the options handed to the host for display and handles clicks on
//! the `open`/`close` actions.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{NotificationConfig, RouterConfig};
use crate::host::{ClientHost, HostError};

pub const ACTION_OPEN: &str = "open";
pub const ACTION_CLOSE: &str = "close";

/// Button shown on a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Data attached to a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Milliseconds since the Unix epoch
    pub date_of_arrival: u64,
    pub primary_key: u32,
}

/// Display options for a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

impl NotificationOptions {
    /// Options for a push message; an absent payload uses the default body
    pub fn for_push(config: &NotificationConfig, payload: Option<&str>) -> Self {
        let date_of_arrival = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            body: payload
                .map(str::to_string)
                .unwrap_or_else(|| config.default_body.clone()),
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            vibrate: config.vibrate.clone(),
            data: NotificationData {
                date_of_arrival,
                primary_key: 1,
            },
            actions: vec![
                NotificationAction {
                    action: ACTION_OPEN.to_string(),
                    title: config.open_title.clone(),
                },
                NotificationAction {
                    action: ACTION_CLOSE.to_string(),
                    title: config.close_title.clone(),
                },
            ],
        }
    }
}

/// Show the notification for a push message
pub async fn show_push(
    host: &dyn ClientHost,
    config: &RouterConfig,
    payload: Option<&str>,
) -> Result<(), HostError> {
    let options = NotificationOptions::for_push(&config.notification, payload);
    info!(title = %config.notification.title, body = %options.body, "Showing push notification");
    host.show_notification(&config.notification.title, &options).await
}

/// Handle a notification click
///
/// The notification is always closed; the `open` action additionally opens
/// the root document. Returns whether a window was opened.
pub async fn handle_click(
    host: &dyn ClientHost,
    config: &RouterConfig,
    tag: &str,
    action: Option<&str>,
) -> Result<bool, HostError> {
    host.close_notification(tag).await?;

    if action != Some(ACTION_OPEN) {
        debug!(tag = tag, action = ?action, "Notification dismissed");
        return Ok(false);
    }

    let root = config
        .root_url()
        .map_err(|e| HostError::Rejected(format!("invalid root document URL: {}", e)))?;
    info!(url = %root, "Opening window from notification");
    host.open_window(&root).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingHost;

    #[test]
    fn test_default_options() {
        let options = NotificationOptions::for_push(&NotificationConfig::default(), None);
        assert_eq!(options.body, "New update available");
        assert_eq!(options.icon, "/static/icons/icon-192x192.png");
        assert_eq!(options.badge, "/static/icons/icon-72x72.png");
        assert_eq!(options.vibrate, vec![200, 100, 200]);
        assert_eq!(options.data.primary_key, 1);
        assert!(options.data.date_of_arrival > 0);

        let actions: Vec<&str> = options.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(actions, vec!["open", "close"]);
        assert_eq!(options.actions[0].title, "Open SwiftSync");
    }

    #[test]
    fn test_payload_becomes_body() {
        let options =
            NotificationOptions::for_push(&NotificationConfig::default(), Some("3 new lectures"));
        assert_eq!(options.body, "3 new lectures");
    }

    #[test]
    fn test_serialized_shape() {
        let options = NotificationOptions::for_push(&NotificationConfig::default(), None);
        let json = serde_json::to_value(&options).unwrap();
        assert!(json["data"]["dateOfArrival"].is_u64());
        assert_eq!(json["data"]["primaryKey"], 1);
        assert_eq!(json["actions"][1]["action"], "close");
    }

    #[tokio::test]
    async fn test_show_push() {
        let host = RecordingHost::new();
        let config = RouterConfig::new().unwrap();
        show_push(&host, &config, Some("hello")).await.unwrap();

        let shown = host.notifications();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].0, "SwiftSync");
        assert_eq!(shown[0].1.body, "hello");
    }

    #[tokio::test]
    async fn test_open_click_opens_root() {
        let host = RecordingHost::new();
        let config = RouterConfig::new().unwrap();

        let opened = handle_click(&host, &config, "SwiftSync", Some("open")).await.unwrap();
        assert!(opened);
        assert_eq!(host.closed(), vec!["SwiftSync"]);
        assert_eq!(host.opened_windows(), vec!["http://127.0.0.1:8000/"]);
    }

    #[tokio::test]
    async fn test_other_clicks_only_close() {
        let host = RecordingHost::new();
        let config = RouterConfig::new().unwrap();

        assert!(!handle_click(&host, &config, "SwiftSync", Some("close")).await.unwrap());
        assert!(!handle_click(&host, &config, "SwiftSync", None).await.unwrap());
        assert_eq!(host.closed().len(), 2);
        assert!(host.opened_windows().is_empty());
    }
}
