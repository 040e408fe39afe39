//! Push and notification-click handlers.

use tracing::{debug, info, warn};
use url::Url;

use crate::clients::{ClientError, ClientWindow, Clients};
use crate::config::{ClickMatch, WorkerConfig};
use crate::notification::{self, Notification, Notifier, NotifyError, PushPayload};

/// How a notification click was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// An existing window was brought to the front.
    Focused(ClientWindow),
    /// No window matched, so a new one was opened on the target.
    Opened(ClientWindow),
}

impl ClickOutcome {
    pub fn window(&self) -> &ClientWindow {
        match self {
            ClickOutcome::Focused(window) | ClickOutcome::Opened(window) => window,
        }
    }
}

/// Render a push message and show it.
///
/// Missing or unreadable payloads still show the generic notification.
pub async fn on_push(
    config: &WorkerConfig,
    data: Option<&[u8]>,
    notifier: &dyn Notifier,
) -> Result<Notification, NotifyError> {
    let notification = match PushPayload::decode(data) {
        Some(payload) => notification::render(&payload, &config.notifications),
        None => notification::generic(&config.notifications),
    };

    info!(tag = notification.tag(), title = %notification.title, "Push received");
    notifier.show(&notification).await?;
    Ok(notification)
}

/// Close the clicked notification and bring the app forward.
///
/// The first open window that matches under [`ClickMatch`] is focused;
/// otherwise a window is opened on the notification's target.
pub async fn on_notification_click(
    config: &WorkerConfig,
    notification: &Notification,
    clients: &dyn Clients,
    notifier: &dyn Notifier,
) -> Result<ClickOutcome, ClientError> {
    if let Err(e) = notifier.close(notification.tag()).await {
        warn!(tag = notification.tag(), error = %e, "Failed to close notification");
    }

    let target = click_target(config, notification);
    let windows = clients.match_all().await?;

    let matching = windows
        .iter()
        .find(|window| window_matches(config, &window.url, &target));

    match matching {
        Some(window) => {
            debug!(client = window.id.as_str(), url = %window.url, "Focusing existing window");
            Ok(ClickOutcome::Focused(clients.focus(&window.id).await?))
        }
        None => {
            debug!(url = %target, "Opening window");
            Ok(ClickOutcome::Opened(clients.open_window(&target).await?))
        }
    }
}

fn click_target(config: &WorkerConfig, notification: &Notification) -> Url {
    config.resolve(notification.target()).unwrap_or_else(|e| {
        warn!(target = notification.target(), error = %e, "Bad notification target, using root");
        config.origin.clone()
    })
}

fn window_matches(config: &WorkerConfig, window: &Url, target: &Url) -> bool {
    match config.click_match {
        ClickMatch::Root => config.is_same_origin(window) && window.path() == "/",
        ClickMatch::Exact => window == target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::WindowClients;
    use crate::notification::NotificationTray;

    fn url(path: &str) -> Url {
        Url::parse("https://spyder.example/").unwrap().join(path).unwrap()
    }

    fn config() -> WorkerConfig {
        WorkerConfig::new("v1", url("/"))
    }

    #[tokio::test]
    async fn test_push_shows_rendered_notification() {
        let tray = NotificationTray::new();
        let shown = on_push(
            &config(),
            Some(br#"{"type":"CHECKLIST_OPEN","remaining":2,"name":"Trip"}"#),
            &tray,
        )
        .await
        .unwrap();

        assert_eq!(shown.options.body, "2 items left on Trip");
        assert_eq!(tray.get("checklist").await, Some(shown));
    }

    #[tokio::test]
    async fn test_push_without_payload_shows_generic() {
        let tray = NotificationTray::new();
        let shown = on_push(&config(), None, &tray).await.unwrap();
        assert_eq!(shown, notification::generic(&config().notifications));
        assert_eq!(tray.displayed().await.len(), 1);
    }

    #[tokio::test]
    async fn test_push_denied() {
        let tray = NotificationTray::denied();
        let result = on_push(&config(), None, &tray).await;
        assert!(matches!(result, Err(NotifyError::PermissionDenied)));
    }

    #[tokio::test]
    async fn test_click_focuses_root_window() {
        let tray = NotificationTray::new();
        let clients = WindowClients::new();
        clients.add(url("/budget")).await;
        let root = clients.add(url("/")).await;

        let shown = on_push(&config(), Some(br#"{"type":"NOTE_UPDATE"}"#), &tray)
            .await
            .unwrap();
        let outcome = on_notification_click(&config(), &shown, &clients, &tray)
            .await
            .unwrap();

        assert_eq!(outcome, ClickOutcome::Focused(ClientWindow { focused: true, ..root }));
        assert!(tray.displayed().await.is_empty());
        assert_eq!(clients.windows().await.len(), 2);
    }

    #[tokio::test]
    async fn test_click_opens_target_without_match() {
        let tray = NotificationTray::new();
        let clients = WindowClients::new();
        clients.add(url("/notes")).await;

        let shown = on_push(&config(), Some(br#"{"type":"BUDGET_ALERT"}"#), &tray)
            .await
            .unwrap();
        let outcome = on_notification_click(&config(), &shown, &clients, &tray)
            .await
            .unwrap();

        let ClickOutcome::Opened(window) = outcome else {
            panic!("expected a new window");
        };
        assert_eq!(window.url, url("/budget"));
        assert!(window.focused);
    }

    #[tokio::test]
    async fn test_exact_match_focuses_target_window() {
        let config = config().with_click_match(ClickMatch::Exact);
        let tray = NotificationTray::new();
        let clients = WindowClients::new();
        clients.add(url("/")).await;
        let notes = clients.add(url("/notes")).await;

        let shown = on_push(&config, Some(br#"{"type":"NOTE_UPDATE"}"#), &tray)
            .await
            .unwrap();
        let outcome = on_notification_click(&config, &shown, &clients, &tray)
            .await
            .unwrap();

        assert_eq!(outcome.window().id, notes.id);
        assert!(matches!(outcome, ClickOutcome::Focused(_)));
    }

    #[tokio::test]
    async fn test_cross_origin_root_is_not_a_match() {
        let tray = NotificationTray::new();
        let clients = WindowClients::new();
        clients
            .add(Url::parse("https://elsewhere.example/").unwrap())
            .await;

        let shown = on_push(&config(), None, &tray).await.unwrap();
        let outcome = on_notification_click(&config(), &shown, &clients, &tray)
            .await
            .unwrap();

        assert_eq!(outcome.window().url, url("/"));
        assert!(matches!(outcome, ClickOutcome::Opened(_)));
    }
}
