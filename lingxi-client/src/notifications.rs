//! User-facing notifications emitted by the stores.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// Shared sink the presentation layer drains.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    queue: Arc<Mutex<Vec<Notification>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        let notification = Notification::new(level, message);
        if let Ok(mut queue) = self.queue.lock() {
            queue.push(notification);
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Error, message);
    }

    /// Take everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        self.queue
            .lock()
            .map(|mut queue| std::mem::take(&mut *queue))
            .unwrap_or_default()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_empties_queue_in_order() {
        let notifier = Notifier::new();
        notifier.success("saved");
        notifier.warning("server hiccup");
        let drained = notifier.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].level, NotificationLevel::Success);
        assert_eq!(drained[1].message, "server hiccup");
        assert_eq!(notifier.pending(), 0);
    }

    #[test]
    fn info_is_queued_at_info_level() {
        let notifier = Notifier::new();
        notifier.info("no knowledge graph yet");
        let drained = notifier.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].level, NotificationLevel::Info);
        assert_eq!(drained[0].message, "no knowledge graph yet");
    }
}
