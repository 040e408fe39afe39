//! Notification display.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use super::Notification;

/// Errors from the host's notification API.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification permission denied")]
    PermissionDenied,

    #[error("Display failed: {0}")]
    DisplayFailed(String),
}

/// Notification API exposed by the host.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Display `notification`, replacing any shown with the same tag.
    async fn show(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Close the notification with `tag`. Returns whether one was shown.
    async fn close(&self, tag: &str) -> Result<bool, NotifyError>;
}

#[derive(Debug, Default)]
struct TrayState {
    shown: Vec<Notification>,
    alerts: usize,
    permission_denied: bool,
}

/// In-process notification tray.
///
/// Keeps at most one notification per tag. Showing a new tag alerts the
/// user; replacing an existing tag alerts only when `renotify` is set.
#[derive(Debug, Clone, Default)]
pub struct NotificationTray {
    state: Arc<RwLock<TrayState>>,
}

impl NotificationTray {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tray whose permission prompt was refused.
    pub fn denied() -> Self {
        Self {
            state: Arc::new(RwLock::new(TrayState {
                permission_denied: true,
                ..Default::default()
            })),
        }
    }

    /// Notifications currently on screen, oldest first.
    pub async fn displayed(&self) -> Vec<Notification> {
        self.state.read().await.shown.clone()
    }

    pub async fn get(&self, tag: &str) -> Option<Notification> {
        self.state
            .read()
            .await
            .shown
            .iter()
            .find(|n| n.tag() == tag)
            .cloned()
    }

    /// How many times the user was alerted (sound, vibration, banner).
    pub async fn alert_count(&self) -> usize {
        self.state.read().await.alerts
    }
}

#[async_trait]
impl Notifier for NotificationTray {
    async fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut state = self.state.write().await;
        if state.permission_denied {
            return Err(NotifyError::PermissionDenied);
        }

        let alert = match state.shown.iter().position(|n| n.tag() == notification.tag()) {
            Some(index) => {
                state.shown[index] = notification.clone();
                notification.options.renotify
            }
            None => {
                state.shown.push(notification.clone());
                true
            }
        };
        if alert {
            state.alerts += 1;
        }

        debug!(tag = notification.tag(), alert, "Notification shown");
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<bool, NotifyError> {
        let mut state = self.state.write().await;
        let before = state.shown.len();
        state.shown.retain(|n| n.tag() != tag);
        Ok(state.shown.len() != before)
    }
}
