//! Patron notifications
//!
//! Delivery is fire-and-forget: callers never wait on it and nothing is retried.

/// Outbound notification channel
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, patron_id: i64, message: &str);
}

/// Writes notifications to the log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, patron_id: i64, message: &str) {
        tracing::info!(patron_id, "Notification: {}", message);
    }
}
