//! # Spyder Offline Worker
//!
//! Background worker that keeps the Spyder app usable offline and turns
//! push messages into notifications.
//!
//! ## Features
//!
//! - **Install**: pre-cache the asset manifest into a fresh cache generation
//! - **Activate**: delete every other generation and claim open windows
//! - **Fetch**: cache-first for same-origin GETs, offline page for navigations
//! - **Push**: typed payloads rendered through fixed templates
//! - **Notification click**: focus a matching window or open the target
//!
//! ## Architecture
//!
//! ```text
//! WorkerHost (event queue)
//!     │
//!     └── ServiceWorker (one version)
//!             ├── SharedRegistration (installing / waiting / active, per scope)
//!             ├── KeepAlive (waitUntil)
//!             ├── lifecycle ──► CacheStore, Network, Clients
//!             ├── fetch ──────► CacheStore, Network
//!             └── router ─────► Notifier, Clients
//! ```

pub mod clients;
pub mod config;
pub mod event;
pub mod fetch;
pub mod host;
pub mod lifecycle;
pub mod manifest;
pub mod notification;
pub mod registration;
pub mod router;
pub mod worker;

use thiserror::Error;

pub use clients::{ClientError, ClientId, ClientWindow, Clients, WindowClients};
pub use config::{ClickMatch, ConfigError, NotificationConfig, WorkerConfig};
pub use event::{KeepAlive, LifetimeGuard};
pub use fetch::{on_fetch, FetchDecision, FetchError};
pub use host::WorkerHost;
pub use lifecycle::{on_activate, on_install, ActivateReport, InstallOutcome, LifecycleError};
pub use manifest::AssetManifest;
pub use notification::{
    Notification, NotificationKind, NotificationTray, Notifier, NotifyError, PushPayload,
};
pub use registration::{
    Registration, SharedRegistration, StateChange, WorkerState, WorkerVersion, WorkerVersionId,
};
pub use router::{on_notification_click, on_push, ClickOutcome};
pub use worker::{EventOutcome, ServiceWorker, WorkerEvent};

/// Errors surfaced by [`ServiceWorker`] and [`WorkerHost`].
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("No installed version is waiting to activate")]
    NothingWaiting,

    #[error("Worker host has shut down")]
    HostClosed,
}
