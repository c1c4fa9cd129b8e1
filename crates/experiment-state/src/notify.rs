//! Success / error notification sinks
//!
//! The store reports every outcome through a `Notifier`. Notifications are
//! fire-and-forget and never influence the operation result.

use tracing::{info, warn};

use crate::error::StoreError;

/// Sink for user-facing operation outcomes
pub trait Notifier: Send + Sync {
    fn on_success(&self, message: &str);

    fn on_error(&self, message: &str, cause: &StoreError);
}

/// Logs notifications through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn on_success(&self, message: &str) {
        info!(event = "notify.success", "{}", message);
    }

    fn on_error(&self, message: &str, cause: &StoreError) {
        warn!(event = "notify.error", error = %cause, "{}", message);
    }
}

/// Discards all notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn on_success(&self, _message: &str) {}

    fn on_error(&self, _message: &str, _cause: &StoreError) {}
}
