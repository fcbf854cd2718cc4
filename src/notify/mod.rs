//! Push notifications and background sync

pub mod push;
pub mod sync;

pub use push::{
    handle_click, show_push, NotificationAction, NotificationData, NotificationOptions,
    ACTION_CLOSE, ACTION_OPEN,
};
pub use sync::sync_now;
