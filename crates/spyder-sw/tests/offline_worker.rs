//! End-to-end behaviour of the offline worker through its host event loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use spyder_cache::{CacheEntry, CacheError, CacheKey, CacheStore, DiskCacheStore, MemoryCacheStore};
use spyder_net::{NetError, Network, Request, Response};
use spyder_sw::{
    AssetManifest, ClickOutcome, EventOutcome, FetchDecision, NotificationTray, Registration,
    ServiceWorker, SharedRegistration, WindowClients, WorkerConfig, WorkerError, WorkerEvent,
    WorkerHost, WorkerState,
};
use url::Url;

const ORIGIN: &str = "https://spyder.example/";

fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// A tiny origin server that can be switched off.
struct FakeSite {
    pages: HashMap<Url, &'static str>,
    online: AtomicBool,
    calls: AtomicUsize,
}

impl FakeSite {
    fn new(paths: &[(&str, &'static str)]) -> Arc<Self> {
        Arc::new(Self {
            pages: paths.iter().map(|(p, body)| (url(p), *body)).collect(),
            online: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        })
    }

    fn go_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for FakeSite {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(NetError::RequestFailed("connection refused".to_string()));
        }
        Ok(match self.pages.get(&request.url) {
            Some(body) => Response::new(request.url.clone(), StatusCode::OK, *body),
            None => Response::new(request.url.clone(), StatusCode::NOT_FOUND, "not found"),
        })
    }
}

/// Wraps a store and refuses to delete one generation.
struct StubbornStore {
    inner: MemoryCacheStore,
    undeletable: String,
}

#[async_trait]
impl CacheStore for StubbornStore {
    async fn generation_names(&self) -> Result<Vec<String>, CacheError> {
        self.inner.generation_names().await
    }

    async fn put_batch(&self, generation: &str, entries: Vec<CacheEntry>) -> Result<(), CacheError> {
        self.inner.put_batch(generation, entries).await
    }

    async fn match_key(
        &self,
        generation: &str,
        key: &CacheKey,
    ) -> Result<Option<CacheEntry>, CacheError> {
        self.inner.match_key(generation, key).await
    }

    async fn entry_keys(&self, generation: &str) -> Result<Vec<CacheKey>, CacheError> {
        self.inner.entry_keys(generation).await
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool, CacheError> {
        if generation == self.undeletable {
            return Err(CacheError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "locked",
            )));
        }
        self.inner.delete_generation(generation).await
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("spyder_sw=debug,spyder_cache=debug")
        .with_test_writer()
        .try_init();
}

fn manifest() -> AssetManifest {
    AssetManifest::new(["/", "/index.html", "/manifest.json", "/assets/icon.png"])
}

fn site() -> Arc<FakeSite> {
    FakeSite::new(&[
        ("/", "<html>root</html>"),
        ("/index.html", "<html>index</html>"),
        ("/manifest.json", "{}"),
        ("/assets/icon.png", "png"),
    ])
}

fn config(generation: &str) -> WorkerConfig {
    WorkerConfig::new(generation, url("/")).with_manifest(manifest())
}

struct Harness {
    worker: Arc<ServiceWorker>,
    host: WorkerHost,
    clients: WindowClients,
    tray: NotificationTray,
}

fn start(config: WorkerConfig, store: Arc<dyn CacheStore>, network: Arc<dyn Network>) -> Harness {
    let registration = Registration::new(config.origin.clone()).into_shared();
    start_in(registration, config, store, network)
}

/// Start a worker as a new version of an existing registration.
fn start_in(
    registration: SharedRegistration,
    config: WorkerConfig,
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
) -> Harness {
    init_tracing();
    let clients = WindowClients::new();
    let tray = NotificationTray::new();
    let worker = ServiceWorker::new(
        config,
        store,
        network,
        Arc::new(clients.clone()),
        Arc::new(tray.clone()),
    )
    .with_registration(registration);
    let worker = Arc::new(worker);
    let host = WorkerHost::spawn(Arc::clone(&worker));
    Harness {
        worker,
        host,
        clients,
        tray,
    }
}

async fn fetch(harness: &Harness, request: Request) -> Result<Response, WorkerError> {
    match harness.host.dispatch(WorkerEvent::Fetch(request)).await? {
        EventOutcome::Fetched(decision) => Ok(decision
            .response()
            .cloned()
            .expect("active worker should respond")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn install_and_activate_leave_one_generation_with_the_manifest() {
    let store = MemoryCacheStore::new();
    let harness = start(config("v1"), Arc::new(store.clone()), site());

    harness.host.dispatch(WorkerEvent::Install).await.unwrap();

    assert_eq!(harness.worker.active_state().await, Some(WorkerState::Activated));
    assert_eq!(store.generation_names().await.unwrap(), vec!["v1"]);

    let mut keys: Vec<String> = store
        .entry_keys("v1")
        .await
        .unwrap()
        .iter()
        .map(|k| k.as_str().to_string())
        .collect();
    keys.sort();
    let mut expected: Vec<String> = manifest()
        .resolve(&url("/"))
        .unwrap()
        .iter()
        .map(|u| CacheKey::get(u).as_str().to_string())
        .collect();
    expected.sort();
    assert_eq!(keys, expected);
}

#[tokio::test]
async fn failed_precache_rolls_back_and_keeps_previous_worker() {
    let store = MemoryCacheStore::new();
    let network = site();
    let first = start(config("v1"), Arc::new(store.clone()), network.clone());
    first.host.dispatch(WorkerEvent::Install).await.unwrap();

    let broken = config("v2").with_manifest(AssetManifest::new(["/", "/missing.css"]));
    let second = start_in(
        first.worker.registration(),
        broken,
        Arc::new(store.clone()),
        network.clone(),
    );

    let result = second.host.dispatch(WorkerEvent::Install).await;
    assert!(matches!(result, Err(WorkerError::Lifecycle(_))));
    assert_eq!(second.worker.state().await, Some(WorkerState::Redundant));
    assert!(!second.worker.has_waiting().await);
    assert_eq!(first.worker.state().await, Some(WorkerState::Activated));
    assert!(first.worker.is_controlling().await);
    assert_eq!(store.generation_names().await.unwrap(), vec!["v1"]);

    network.go_offline();
    let response = fetch(&first, Request::get(url("/index.html"))).await.unwrap();
    assert!(response.from_cache());
    assert_eq!(&response.body[..], b"<html>index</html>");
}

#[tokio::test]
async fn consecutive_activations_remove_the_prior_generation() {
    let store = MemoryCacheStore::new();
    let registration = Registration::new(url("/")).into_shared();
    let mut previous: Option<Harness> = None;

    for generation in ["v1", "v2", "v3"] {
        let harness = start_in(
            registration.clone(),
            config(generation),
            Arc::new(store.clone()),
            site(),
        );
        harness.host.dispatch(WorkerEvent::Install).await.unwrap();
        assert_eq!(store.generation_names().await.unwrap(), vec![generation]);
        assert_eq!(harness.worker.state().await, Some(WorkerState::Activated));

        if let Some(old) = previous.take() {
            assert_eq!(old.worker.state().await, Some(WorkerState::Redundant));
            let stale = old
                .host
                .dispatch(WorkerEvent::Fetch(Request::get(url("/index.html"))))
                .await
                .unwrap();
            assert!(matches!(stale, EventOutcome::Fetched(FetchDecision::Passthrough)));
            old.host.shutdown().await;
        }
        previous = Some(harness);
    }
}

#[tokio::test]
async fn stale_generation_that_cannot_be_deleted_is_skipped() {
    let memory = MemoryCacheStore::new();
    for generation in ["v1", "v2"] {
        let entry = CacheEntry::from_response(
            &Request::get(url("/")),
            &Response::new(url("/"), StatusCode::OK, generation),
        );
        memory.put_batch(generation, vec![entry]).await.unwrap();
    }
    let store = StubbornStore {
        inner: memory.clone(),
        undeletable: "v1".to_string(),
    };
    let harness = start(config("v3"), Arc::new(store), site());

    harness.worker.install().await.unwrap();
    let report = harness.worker.activate().await.unwrap();

    assert_eq!(report.deleted, vec!["v2".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "v1");
    assert_eq!(memory.generation_names().await.unwrap(), vec!["v1", "v3"]);
    assert!(harness.worker.is_controlling().await);
}

#[tokio::test]
async fn cached_requests_never_touch_the_network() {
    let network = site();
    let harness = start(config("v1"), Arc::new(MemoryCacheStore::new()), network.clone());
    harness.host.dispatch(WorkerEvent::Install).await.unwrap();
    let after_install = network.calls();

    let response = fetch(&harness, Request::get(url("/manifest.json"))).await.unwrap();

    assert!(response.from_cache());
    assert_eq!(response.text().unwrap(), "{}");
    assert_eq!(network.calls(), after_install);
}

#[tokio::test]
async fn misses_are_served_from_the_network_and_not_stored() {
    let network = site();
    let store = MemoryCacheStore::new();
    let harness = start(config("v1"), Arc::new(store.clone()), network.clone());
    harness.host.dispatch(WorkerEvent::Install).await.unwrap();
    let before = store.entry_keys("v1").await.unwrap();

    let response = fetch(&harness, Request::get(url("/api/reminders"))).await.unwrap();

    assert!(!response.from_cache());
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(store.entry_keys("v1").await.unwrap(), before);
}

#[tokio::test]
async fn offline_navigation_serves_the_cached_root_document() {
    let network = site();
    let harness = start(config("v1"), Arc::new(MemoryCacheStore::new()), network.clone());
    harness.host.dispatch(WorkerEvent::Install).await.unwrap();
    network.go_offline();

    let page = fetch(&harness, Request::navigate(url("/budget/groceries")))
        .await
        .unwrap();
    assert_eq!(page.text().unwrap(), "<html>index</html>");

    let subresource = fetch(&harness, Request::get(url("/api/budget"))).await;
    assert!(matches!(subresource, Err(WorkerError::Fetch(_))));
}

#[tokio::test]
async fn disk_store_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let network = site();

    let store = DiskCacheStore::open(dir.path()).await.unwrap();
    let harness = start(config("v1"), Arc::new(store), network.clone());
    harness.host.dispatch(WorkerEvent::Install).await.unwrap();
    harness.host.shutdown().await;

    network.go_offline();
    let reopened = DiskCacheStore::open(dir.path()).await.unwrap();
    let harness = start(config("v1"), Arc::new(reopened.clone()), network.clone());
    harness.worker.install().await.unwrap_err();

    // The failed install left the old generation in place.
    assert_eq!(reopened.generation_names().await.unwrap(), vec!["v1"]);
    let entry = reopened
        .match_key("v1", &CacheKey::get(&url("/index.html")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.to_response().unwrap().text().unwrap(), "<html>index</html>");
}

#[tokio::test]
async fn reminder_push_groups_under_its_tag() {
    let harness = start(config("v1"), Arc::new(MemoryCacheStore::new()), site());
    let payload = br#"{"type":"REMINDER_DUE","title":"Pay rent","details":"Due today"}"#;

    for _ in 0..2 {
        let outcome = harness
            .host
            .dispatch(WorkerEvent::Push(Some(payload.as_slice().into())))
            .await
            .unwrap();
        let EventOutcome::Shown(notification) = outcome else {
            panic!("expected a notification");
        };
        assert_eq!(notification.tag(), "reminder");
        assert_eq!(notification.options.body, "Due today");
    }

    assert_eq!(harness.tray.displayed().await.len(), 1);
    assert_eq!(harness.tray.alert_count().await, 2);
}

#[tokio::test]
async fn empty_push_shows_the_generic_notification() {
    let harness = start(config("v1"), Arc::new(MemoryCacheStore::new()), site());

    for data in [None, Some(bytes::Bytes::new()), Some("not json".into())] {
        let outcome = harness.host.dispatch(WorkerEvent::Push(data)).await.unwrap();
        let EventOutcome::Shown(notification) = outcome else {
            panic!("expected a notification");
        };
        assert_eq!(notification.title, "Spyder");
        assert_eq!(notification.options.body, "You have a new notification.");
    }
}

#[tokio::test]
async fn click_focuses_the_root_window() {
    let harness = start(config("v1"), Arc::new(MemoryCacheStore::new()), site());
    let root = harness.clients.add(url("/")).await;

    let EventOutcome::Shown(notification) = harness
        .host
        .dispatch(WorkerEvent::Push(Some(br#"{"type":"BUDGET_ALERT"}"#.as_slice().into())))
        .await
        .unwrap()
    else {
        panic!("expected a notification");
    };

    let outcome = harness
        .host
        .dispatch(WorkerEvent::NotificationClick(notification))
        .await
        .unwrap();

    let EventOutcome::Clicked(ClickOutcome::Focused(window)) = outcome else {
        panic!("expected the root window to be focused");
    };
    assert_eq!(window.id, root.id);
    assert_eq!(harness.clients.windows().await.len(), 1);
    assert!(harness.tray.displayed().await.is_empty());
}

#[tokio::test]
async fn click_without_windows_opens_exactly_one() {
    let harness = start(config("v1"), Arc::new(MemoryCacheStore::new()), site());

    let EventOutcome::Shown(notification) = harness
        .host
        .dispatch(WorkerEvent::Push(Some(br#"{"type":"NOTE_UPDATE","note":"Ideas"}"#.as_slice().into())))
        .await
        .unwrap()
    else {
        panic!("expected a notification");
    };

    let outcome = harness
        .host
        .dispatch(WorkerEvent::NotificationClick(notification))
        .await
        .unwrap();

    let EventOutcome::Clicked(ClickOutcome::Opened(window)) = outcome else {
        panic!("expected a new window");
    };
    assert_eq!(window.url, url("/notes"));
    assert_eq!(harness.clients.windows().await.len(), 1);
}
