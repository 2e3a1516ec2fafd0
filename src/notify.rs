use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

/// A transient message for the user (a toast in the web dashboard).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Info)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Success)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Error)
    }
}

/// Whatever displays notifications. Display timing and removal are its business.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Sends notifications to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Error => error!(target: "noticeboard::toast", "{}", notification.message),
            Severity::Warning => warn!(target: "noticeboard::toast", "{}", notification.message),
            Severity::Info | Severity::Success => {
                info!(target: "noticeboard::toast", "{}", notification.message)
            }
        }
    }
}

/// Forwards notifications into a channel.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        // Receiver gone means nobody is displaying anymore.
        let _ = self.tx.send(notification);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEntry {
    pub title: String,
    pub message: String,
    pub time: DateTime<Utc>,
}

/// The bell-menu list of notifications and its unread badge.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    entries: Mutex<Vec<InboxEntry>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a notice was posted; newest entries come first.
    pub fn record_new_notice(&self) {
        self.push(InboxEntry {
            title: "New Notice".to_string(),
            message: "A new notice has been posted".to_string(),
            time: Utc::now(),
        });
    }

    pub fn push(&self, entry: InboxEntry) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(0, entry);
    }

    pub fn unread_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn entries(&self) -> Vec<InboxEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}
