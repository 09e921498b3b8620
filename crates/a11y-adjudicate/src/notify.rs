use std::sync::Mutex;

use a11y_core::Notification;
use tracing::info;

/// Fire-and-forget delivery. Implementations swallow their own failures.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: &Notification);
}

/// Writes every notification to the log.
#[derive(Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn publish(&self, n: &Notification) {
        info!(
            session_id = %n.session_id,
            task_id = ?n.task_id.as_ref().map(|t| t.as_str()),
            kind = %n.kind,
            recipient = ?n.recipient,
            "{}",
            n.message
        );
    }
}

/// Keeps notifications in memory for inspection.
#[derive(Default)]
pub struct MemorySink {
    seen: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl NotificationSink for MemorySink {
    fn publish(&self, n: &Notification) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(n.clone());
        }
    }
}
