//! Worker versions and the registration state machine.
//!
//! ```text
//! Parsed → Installing → Installed → Activating → Activated
//!              │                                     │
//!              └──────────── Redundant ◄─────────────┘ (replaced)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use url::Url;

/// Unique identifier for a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerVersionId(u64);

impl WorkerVersionId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Worker version state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerState {
    /// Script evaluated, nothing run yet.
    #[default]
    Parsed,
    /// Install handler running.
    Installing,
    /// Installed and waiting for activation.
    Installed,
    /// Activate handler running.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Install failed or replaced by a newer version.
    Redundant,
}

impl WorkerState {
    /// Only an active worker intercepts requests.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }
}

/// One installed (or installing) version of the worker.
#[derive(Debug, Clone)]
pub struct WorkerVersion {
    pub id: WorkerVersionId,

    /// Cache generation this version owns.
    pub generation: String,

    pub state: WorkerState,

    /// Activate as soon as installed instead of waiting for old pages.
    pub skip_waiting: bool,

    pub state_changed_at: Instant,
}

impl WorkerVersion {
    pub fn new(generation: &str) -> Self {
        Self {
            id: WorkerVersionId::new(),
            generation: generation.to_string(),
            state: WorkerState::Parsed,
            skip_waiting: false,
            state_changed_at: Instant::now(),
        }
    }
}

/// Published whenever a version changes state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub version: WorkerVersionId,
    pub generation: String,
    pub state: WorkerState,
}

/// One registration per scope, shared by every worker version in it.
pub type SharedRegistration = Arc<RwLock<Registration>>;

/// The installing / waiting / active slots of one scope.
#[derive(Debug)]
pub struct Registration {
    pub scope: Url,
    pub installing: Option<WorkerVersion>,
    pub waiting: Option<WorkerVersion>,
    pub active: Option<WorkerVersion>,
    events: Option<mpsc::UnboundedSender<StateChange>>,
}

impl Registration {
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            installing: None,
            waiting: None,
            active: None,
            events: None,
        }
    }

    /// Publish state changes on `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<StateChange>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn into_shared(self) -> SharedRegistration {
        Arc::new(RwLock::new(self))
    }

    /// Start installing a new version. A previous installing version is
    /// superseded.
    pub fn begin_install(&mut self, generation: &str) -> WorkerVersionId {
        if let Some(mut stale) = self.installing.take() {
            self.transition(&mut stale, WorkerState::Redundant);
        }
        let mut version = WorkerVersion::new(generation);
        let id = version.id;
        self.transition(&mut version, WorkerState::Installing);
        self.installing = Some(version);
        id
    }

    /// Installing → Installed. A previously waiting version is replaced.
    ///
    /// Does nothing unless `id` is still the installing version.
    pub fn install_complete(&mut self, id: WorkerVersionId, skip_waiting: bool) -> bool {
        let Some(mut version) = self.installing.take_if(|v| v.id == id) else {
            return false;
        };
        version.skip_waiting = skip_waiting;
        self.transition(&mut version, WorkerState::Installed);
        if let Some(mut replaced) = self.waiting.take() {
            self.transition(&mut replaced, WorkerState::Redundant);
        }
        self.waiting = Some(version);
        true
    }

    /// Installing → Redundant. The active version is untouched.
    pub fn install_failed(&mut self, id: WorkerVersionId) -> bool {
        let Some(mut version) = self.installing.take_if(|v| v.id == id) else {
            return false;
        };
        self.transition(&mut version, WorkerState::Redundant);
        true
    }

    /// Waiting → Activating; the old active version becomes redundant.
    ///
    /// Returns the generation the new version owns, or `None` when `id` is
    /// not the waiting version.
    pub fn begin_activate(&mut self, id: WorkerVersionId) -> Option<String> {
        let mut version = self.waiting.take_if(|v| v.id == id)?;
        if let Some(mut old) = self.active.take() {
            self.transition(&mut old, WorkerState::Redundant);
        }
        self.transition(&mut version, WorkerState::Activating);
        let generation = version.generation.clone();
        self.active = Some(version);
        Some(generation)
    }

    /// Activating → Activated.
    pub fn activation_complete(&mut self, id: WorkerVersionId) -> bool {
        let Some(mut version) = self.active.take() else {
            return false;
        };
        let changed = version.id == id && version.state == WorkerState::Activating;
        if changed {
            self.transition(&mut version, WorkerState::Activated);
        }
        self.active = Some(version);
        changed
    }

    /// Current state of version `id`.
    ///
    /// A version that no longer holds a slot was replaced or failed, and
    /// is reported as redundant.
    pub fn state_of(&self, id: WorkerVersionId) -> WorkerState {
        [&self.installing, &self.waiting, &self.active]
            .into_iter()
            .flatten()
            .find(|v| v.id == id)
            .map_or(WorkerState::Redundant, |v| v.state)
    }

    /// Whether version `id` is the active version and may intercept
    /// requests.
    pub fn controls(&self, id: WorkerVersionId) -> bool {
        self.active
            .as_ref()
            .is_some_and(|v| v.id == id && v.state.can_intercept_fetch())
    }

    pub fn get_active(&self) -> Option<&WorkerVersion> {
        self.active.as_ref()
    }

    /// Whether the active version may intercept requests.
    pub fn is_controlling(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|v| v.state.can_intercept_fetch())
    }

    fn transition(&self, version: &mut WorkerVersion, state: WorkerState) {
        version.state = state;
        version.state_changed_at = Instant::now();
        debug!(generation = %version.generation, ?state, "Worker state changed");
        if let Some(ref events) = self.events {
            let _ = events.send(StateChange {
                version: version.id,
                generation: version.generation.clone(),
                state,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> Registration {
        Registration::new(Url::parse("https://spyder.example/").unwrap())
    }

    #[test]
    fn test_registration_lifecycle() {
        let mut registration = registration();

        let v1 = registration.begin_install("v1");
        assert_eq!(
            registration.installing.as_ref().unwrap().state,
            WorkerState::Installing
        );

        assert!(registration.install_complete(v1, true));
        assert!(registration.installing.is_none());
        assert!(registration.waiting.as_ref().unwrap().skip_waiting);

        assert_eq!(registration.begin_activate(v1).as_deref(), Some("v1"));
        assert!(!registration.is_controlling());
        assert!(registration.activation_complete(v1));
        assert!(registration.is_controlling());
        assert!(registration.controls(v1));
        assert!(registration.waiting.is_none());
    }

    #[test]
    fn test_failed_install_keeps_active_version() {
        let mut registration = registration();
        let v1 = registration.begin_install("v1");
        registration.install_complete(v1, true);
        registration.begin_activate(v1);
        registration.activation_complete(v1);

        let v2 = registration.begin_install("v2");
        assert!(registration.install_failed(v2));

        assert!(registration.waiting.is_none());
        assert!(registration.begin_activate(v2).is_none());
        assert_eq!(registration.get_active().unwrap().generation, "v1");
        assert!(registration.controls(v1));
        assert_eq!(registration.state_of(v1), WorkerState::Activated);
        assert_eq!(registration.state_of(v2), WorkerState::Redundant);
    }

    #[test]
    fn test_state_changes_are_published() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registration = registration().with_events(tx);

        let v1 = registration.begin_install("v1");
        registration.install_complete(v1, false);
        registration.begin_activate(v1);
        registration.activation_complete(v1);

        let states: Vec<WorkerState> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|change| change.state)
            .collect();
        assert_eq!(
            states,
            vec![
                WorkerState::Installing,
                WorkerState::Installed,
                WorkerState::Activating,
                WorkerState::Activated,
            ]
        );
    }

    #[test]
    fn test_activation_replaces_old_version() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registration = registration().with_events(tx);
        let old = registration.begin_install("v1");
        registration.install_complete(old, true);
        registration.begin_activate(old);
        registration.activation_complete(old);

        let new = registration.begin_install("v2");
        registration.install_complete(new, true);
        registration.begin_activate(new);

        let redundant: Vec<StateChange> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|change| change.state == WorkerState::Redundant)
            .collect();
        assert_eq!(redundant.len(), 1);
        assert_eq!(redundant[0].version, old);
        assert_eq!(registration.state_of(old), WorkerState::Redundant);
        assert!(!registration.controls(old));
    }

    #[test]
    fn test_stale_version_cannot_advance() {
        let mut registration = registration();
        let first = registration.begin_install("v1");
        let second = registration.begin_install("v2");

        assert_eq!(registration.state_of(first), WorkerState::Redundant);
        assert!(!registration.install_complete(first, true));
        assert!(registration.install_complete(second, true));
        assert!(registration.begin_activate(first).is_none());
        assert_eq!(registration.begin_activate(second).as_deref(), Some("v2"));
    }
}
