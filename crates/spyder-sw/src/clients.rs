//! Window clients: the pages of the app that are currently open.
//!
//! Ownership of windows stays with the host. The worker enumerates them
//! when it needs to and acts on them through [`Clients`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// Errors from the window API.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Client not found: {0}")]
    NotFound(String),

    #[error("Host refused: {0}")]
    Refused(String),
}

/// Opaque client identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Snapshot of an open window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientWindow {
    pub id: ClientId,
    pub url: Url,
    pub focused: bool,
    /// Whether the current worker controls the page.
    pub controlled: bool,
}

/// Window API exposed by the host.
#[async_trait]
pub trait Clients: Send + Sync {
    /// Every open window of the app, controlled or not, in creation order.
    async fn match_all(&self) -> Result<Vec<ClientWindow>, ClientError>;

    async fn focus(&self, id: &ClientId) -> Result<ClientWindow, ClientError>;

    async fn open_window(&self, url: &Url) -> Result<ClientWindow, ClientError>;

    /// Take control of every open window. Returns how many changed hands.
    async fn claim(&self) -> Result<usize, ClientError>;
}

/// In-process window registry.
#[derive(Debug, Clone, Default)]
pub struct WindowClients {
    windows: Arc<RwLock<Vec<ClientWindow>>>,
}

impl WindowClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a window the user opened, not yet controlled by the worker.
    pub async fn add(&self, url: Url) -> ClientWindow {
        let window = ClientWindow {
            id: ClientId::new(),
            url,
            focused: false,
            controlled: false,
        };
        self.windows.write().await.push(window.clone());
        window
    }

    pub async fn remove(&self, id: &ClientId) -> Option<ClientWindow> {
        let mut windows = self.windows.write().await;
        let index = windows.iter().position(|w| &w.id == id)?;
        Some(windows.remove(index))
    }

    pub async fn windows(&self) -> Vec<ClientWindow> {
        self.windows.read().await.clone()
    }
}

#[async_trait]
impl Clients for WindowClients {
    async fn match_all(&self) -> Result<Vec<ClientWindow>, ClientError> {
        Ok(self.windows().await)
    }

    async fn focus(&self, id: &ClientId) -> Result<ClientWindow, ClientError> {
        let mut windows = self.windows.write().await;
        if !windows.iter().any(|w| &w.id == id) {
            return Err(ClientError::NotFound(id.as_str().to_string()));
        }

        let mut focused = None;
        for window in windows.iter_mut() {
            window.focused = &window.id == id;
            if window.focused {
                focused = Some(window.clone());
            }
        }

        debug!(client = id.as_str(), "Focused window");
        focused.ok_or_else(|| ClientError::NotFound(id.as_str().to_string()))
    }

    async fn open_window(&self, url: &Url) -> Result<ClientWindow, ClientError> {
        let mut windows = self.windows.write().await;
        for window in windows.iter_mut() {
            window.focused = false;
        }

        let window = ClientWindow {
            id: ClientId::new(),
            url: url.clone(),
            focused: true,
            controlled: true,
        };
        windows.push(window.clone());

        debug!(client = window.id.as_str(), url = %url, "Opened window");
        Ok(window)
    }

    async fn claim(&self) -> Result<usize, ClientError> {
        let mut windows = self.windows.write().await;
        let mut claimed = 0;
        for window in windows.iter_mut().filter(|w| !w.controlled) {
            window.controlled = true;
            claimed += 1;
        }
        Ok(claimed)
    }
}
