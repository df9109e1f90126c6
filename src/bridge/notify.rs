//! User-facing completion notifications.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Whether the user allowed notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    Granted,
    Denied,
    /// Never asked; treated like `Denied`.
    #[default]
    Default,
}

pub trait Notifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;
    fn notify(&self, title: &str, body: &str);
}

/// Emits notifications as structured log events on the `gojo::notify` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier {
    permission: NotificationPermission,
}

impl LogNotifier {
    pub fn new(permission: NotificationPermission) -> Self {
        Self { permission }
    }
}

impl Notifier for LogNotifier {
    fn permission(&self) -> NotificationPermission {
        self.permission
    }

    fn notify(&self, title: &str, body: &str) {
        info!(target: "gojo::notify", %title, %body, "notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_parses_lowercase() {
        let p: NotificationPermission = serde_json::from_str("\"granted\"").unwrap();
        assert_eq!(p, NotificationPermission::Granted);
        assert_eq!(NotificationPermission::default(), NotificationPermission::Default);
    }
}
