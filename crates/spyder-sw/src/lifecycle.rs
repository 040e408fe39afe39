//! Install and activate handlers.
//!
//! Install fills a brand-new cache generation from the asset manifest in
//! one all-or-nothing batch. Activate garbage-collects every other
//! generation and takes over the open pages.

use futures::future::{join_all, try_join_all};
use spyder_cache::{CacheEntry, CacheError, CacheKey, CacheStore};
use spyder_net::{Network, Request, RequestMode};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::clients::{ClientError, Clients};
use crate::config::{ConfigError, WorkerConfig};

/// Lifecycle errors.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A manifest asset could not be fetched; install must roll back.
    #[error("Pre-cache failed for {url}: {reason}")]
    PrecacheFailure { url: Url, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Claiming clients failed: {0}")]
    Claim(#[from] ClientError),
}

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub generation: String,
    pub cached: Vec<CacheKey>,
    /// Activate without waiting for old pages to close.
    pub skip_waiting: bool,
}

/// Result of an activation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    pub generation: String,
    pub deleted: Vec<String>,
    /// Stale generations that could not be deleted, with the reason.
    pub failed: Vec<(String, String)>,
    /// Windows newly controlled by the worker.
    pub claimed: usize,
}

/// Pre-cache the manifest into the current generation.
///
/// Every asset is fetched before anything is stored, so a failure leaves
/// the store exactly as it was.
pub async fn on_install(
    config: &WorkerConfig,
    store: &dyn CacheStore,
    network: &dyn Network,
) -> Result<InstallOutcome, LifecycleError> {
    info!(generation = %config.generation, "Install");

    let urls = config.manifest.resolve(&config.origin)?;
    info!(count = urls.len(), "Pre-caching files");

    let entries = try_join_all(urls.into_iter().map(|url| precache_one(network, url))).await?;
    let cached = entries
        .iter()
        .map(CacheEntry::key)
        .collect::<Result<Vec<_>, _>>()?;

    store.put_batch(&config.generation, entries).await?;

    Ok(InstallOutcome {
        generation: config.generation.clone(),
        cached,
        skip_waiting: true,
    })
}

async fn precache_one(network: &dyn Network, url: Url) -> Result<CacheEntry, LifecycleError> {
    let mut request = Request::get(url);
    request.mode = RequestMode::SameOrigin;

    let response = network
        .fetch(&request)
        .await
        .map_err(|e| LifecycleError::PrecacheFailure {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;

    if !response.ok() {
        return Err(LifecycleError::PrecacheFailure {
            url: request.url.clone(),
            reason: format!("HTTP {}", response.status),
        });
    }

    debug!(url = %request.url, bytes = response.body.len(), "Fetched asset");
    Ok(CacheEntry::from_response(&request, &response))
}

/// Delete every generation except the current one, then claim clients.
///
/// A generation that fails to delete is logged and reported; the others
/// are still deleted.
pub async fn on_activate(
    config: &WorkerConfig,
    store: &dyn CacheStore,
    clients: &dyn Clients,
) -> Result<ActivateReport, LifecycleError> {
    info!(generation = %config.generation, "Activate");

    let stale: Vec<String> = store
        .generation_names()
        .await?
        .into_iter()
        .filter(|name| name != &config.generation)
        .collect();

    let results = join_all(stale.iter().map(|name| async move {
        info!(generation = %name, "Removing old cache");
        (name, store.delete_generation(name).await)
    }))
    .await;

    let mut report = ActivateReport {
        generation: config.generation.clone(),
        ..Default::default()
    };
    for (name, result) in results {
        match result {
            Ok(_) => report.deleted.push(name.clone()),
            Err(e) => {
                warn!(generation = %name, error = %e, "Failed to remove old cache");
                report.failed.push((name.clone(), e.to_string()));
            }
        }
    }

    report.claimed = clients.claim().await?;
    Ok(report)
}
