//! Notification history shown in the overlay and popup.

use std::collections::VecDeque;

/// Oldest entries are dropped past this many
pub const MAX_NOTIFICATIONS: usize = 50;

#[derive(Clone)]
pub struct NotificationEntry {
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Local>,
}

impl NotificationEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: chrono::Local::now(),
        }
    }

    pub fn time_ago(&self) -> String {
        let now = chrono::Local::now();
        let duration = now.signed_duration_since(self.timestamp);
        if duration.num_seconds() < 60 {
            "just now".to_string()
        } else if duration.num_minutes() < 60 {
            format!("{}m ago", duration.num_minutes())
        } else if duration.num_hours() < 24 {
            format!("{}h ago", duration.num_hours())
        } else {
            self.timestamp.format("%m/%d %H:%M").to_string()
        }
    }
}

pub fn push_notification(notifications: &mut VecDeque<NotificationEntry>, message: impl Into<String>) {
    notifications.push_back(NotificationEntry::new(message));
    while notifications.len() > MAX_NOTIFICATIONS {
        notifications.pop_front();
    }
}

/// User-facing text for a failed wallet or donation operation
pub fn failure_message(error: &str) -> String {
    if error.contains("APDU") || error.contains("6a80") || error.contains("INVALID_DATA") {
        format!(
            "[!!] Failed: {}\n\nMake sure \"Blind Signing\" is enabled in your Ledger Ethereum app settings.",
            error
        )
    } else {
        format!("[!!] Failed: {}", error)
    }
}
