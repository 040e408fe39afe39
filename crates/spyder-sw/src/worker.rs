//! The worker: one configuration, its registration and the host services
//! it acts through.

use std::sync::Arc;

use bytes::Bytes;
use spyder_cache::CacheStore;
use spyder_net::{Network, Request};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::clients::Clients;
use crate::event::KeepAlive;
use crate::fetch::{self, FetchDecision};
use crate::lifecycle::{self, ActivateReport, InstallOutcome};
use crate::notification::{Notification, Notifier};
use crate::registration::{Registration, SharedRegistration, WorkerState, WorkerVersionId};
use crate::router::{self, ClickOutcome};
use crate::{WorkerConfig, WorkerError};

/// Events the host delivers to the worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    /// Raw push data, if the message carried any.
    Push(Option<Bytes>),
    NotificationClick(Notification),
}

impl WorkerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Fetch(_) => "fetch",
            WorkerEvent::Push(_) => "push",
            WorkerEvent::NotificationClick(_) => "notificationclick",
        }
    }
}

/// Result of handling one [`WorkerEvent`].
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed(InstallOutcome),
    Activated(ActivateReport),
    Fetched(FetchDecision),
    Shown(Notification),
    Clicked(ClickOutcome),
}

/// One worker version bound to its cache store, network and host APIs.
///
/// Versions of the same scope share a [`SharedRegistration`]; only the
/// version currently active in it intercepts requests.
pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    clients: Arc<dyn Clients>,
    notifier: Arc<dyn Notifier>,
    registration: SharedRegistration,
    version: RwLock<Option<WorkerVersionId>>,
    keep_alive: KeepAlive,
}

impl ServiceWorker {
    /// Build a worker with a fresh registration for its origin.
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn CacheStore>,
        network: Arc<dyn Network>,
        clients: Arc<dyn Clients>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let registration = Registration::new(config.origin.clone()).into_shared();
        Self {
            config: Arc::new(config),
            store,
            network,
            clients,
            notifier,
            registration,
            version: RwLock::new(None),
            keep_alive: KeepAlive::new(),
        }
    }

    /// Join an existing registration, typically one an older version of
    /// the same scope already uses.
    pub fn with_registration(mut self, registration: SharedRegistration) -> Self {
        self.registration = registration;
        self
    }

    pub fn registration(&self) -> SharedRegistration {
        Arc::clone(&self.registration)
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn keep_alive(&self) -> &KeepAlive {
        &self.keep_alive
    }

    /// Version id assigned when this worker started installing.
    pub async fn version(&self) -> Option<WorkerVersionId> {
        *self.version.read().await
    }

    /// State of this worker's own version; `None` before install.
    pub async fn state(&self) -> Option<WorkerState> {
        let id = self.version().await?;
        Some(self.registration.read().await.state_of(id))
    }

    /// State of the registration's active version, whichever worker owns it.
    pub async fn active_state(&self) -> Option<WorkerState> {
        self.registration.read().await.get_active().map(|v| v.state)
    }

    /// Whether an installed version is waiting to activate.
    pub async fn has_waiting(&self) -> bool {
        self.registration.read().await.waiting.is_some()
    }

    /// Whether this worker's version is the active one.
    pub async fn is_controlling(&self) -> bool {
        match self.version().await {
            Some(id) => self.registration.read().await.controls(id),
            None => false,
        }
    }

    /// Dispatch one event, holding the worker open until it settles.
    pub async fn handle(&self, event: WorkerEvent) -> Result<EventOutcome, WorkerError> {
        self.keep_alive
            .wait_until(async move {
                match event {
                    WorkerEvent::Install => self.install().await.map(EventOutcome::Installed),
                    WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
                    WorkerEvent::Fetch(request) => {
                        self.fetch(&request).await.map(EventOutcome::Fetched)
                    }
                    WorkerEvent::Push(data) => self.push(data.as_deref()).await.map(EventOutcome::Shown),
                    WorkerEvent::NotificationClick(notification) => self
                        .notification_click(&notification)
                        .await
                        .map(EventOutcome::Clicked),
                }
            })
            .await
    }

    /// Install this version. On failure the version is discarded and the
    /// active one, if any, keeps serving.
    pub async fn install(&self) -> Result<InstallOutcome, WorkerError> {
        let id = self
            .registration
            .write()
            .await
            .begin_install(&self.config.generation);
        *self.version.write().await = Some(id);

        match lifecycle::on_install(&self.config, self.store.as_ref(), self.network.as_ref()).await
        {
            Ok(outcome) => {
                if !self
                    .registration
                    .write()
                    .await
                    .install_complete(id, outcome.skip_waiting)
                {
                    warn!(generation = %outcome.generation, "Install superseded by a newer version");
                }
                info!(generation = %outcome.generation, assets = outcome.cached.len(), "Installed");
                Ok(outcome)
            }
            Err(e) => {
                error!(generation = %self.config.generation, error = %e, "Install failed");
                self.registration.write().await.install_failed(id);
                Err(e.into())
            }
        }
    }

    /// Activate this version once it is waiting.
    ///
    /// The version becomes active even if cleanup or claiming fails; the
    /// error is still returned.
    pub async fn activate(&self) -> Result<ActivateReport, WorkerError> {
        let id = self.version().await.ok_or(WorkerError::NothingWaiting)?;
        self.registration
            .write()
            .await
            .begin_activate(id)
            .ok_or(WorkerError::NothingWaiting)?;

        let result =
            lifecycle::on_activate(&self.config, self.store.as_ref(), self.clients.as_ref()).await;
        self.registration.write().await.activation_complete(id);

        match result {
            Ok(report) => {
                info!(
                    generation = %report.generation,
                    deleted = report.deleted.len(),
                    claimed = report.claimed,
                    "Activated"
                );
                Ok(report)
            }
            Err(e) => {
                error!(generation = %self.config.generation, error = %e, "Activation incomplete");
                Err(e.into())
            }
        }
    }

    /// Resolve a request. Unless this version is the active one, every
    /// request passes through.
    pub async fn fetch(&self, request: &Request) -> Result<FetchDecision, WorkerError> {
        if !self.is_controlling().await {
            return Ok(FetchDecision::Passthrough);
        }
        let decision = fetch::on_fetch(
            &self.config,
            self.store.as_ref(),
            self.network.as_ref(),
            request,
        )
        .await?;
        Ok(decision)
    }

    pub async fn push(&self, data: Option<&[u8]>) -> Result<Notification, WorkerError> {
        Ok(router::on_push(&self.config, data, self.notifier.as_ref()).await?)
    }

    pub async fn notification_click(
        &self,
        notification: &Notification,
    ) -> Result<ClickOutcome, WorkerError> {
        let outcome = router::on_notification_click(
            &self.config,
            notification,
            self.clients.as_ref(),
            self.notifier.as_ref(),
        )
        .await?;
        Ok(outcome)
    }
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("generation", &self.config.generation)
            .field("origin", &self.config.origin.as_str())
            .field("pending", &self.keep_alive.pending())
            .finish()
    }
}
