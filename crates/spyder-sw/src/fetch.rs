//! Cache-first fetch resolution.
//!
//! ```text
//! GET, same origin? ── no ──► Passthrough
//!        │ yes
//! cache hit? ── yes ──► stored response
//!        │ no
//! network ok? ── yes ──► network response (not stored)
//!        │ no
//! navigation + cached fallback? ── yes ──► offline page
//!        │ no
//!        └──► error
//! ```

use http::Method;
use spyder_cache::{CacheError, CacheKey, CacheStore};
use spyder_net::{NetError, Network, Request, Response};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, WorkerConfig};

/// Fetch resolution errors. They surface to the page as a failed fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Network(#[from] NetError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What the worker does with an intercepted request.
#[derive(Debug, Clone)]
pub enum FetchDecision {
    /// Not handled; the request takes the default network path.
    Passthrough,
    /// Answered by the worker.
    Respond(Response),
}

impl FetchDecision {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchDecision::Passthrough => None,
            FetchDecision::Respond(response) => Some(response),
        }
    }
}

/// Resolve one intercepted request.
///
/// Misses go to the network once and are never written back to the cache.
pub async fn on_fetch(
    config: &WorkerConfig,
    store: &dyn CacheStore,
    network: &dyn Network,
    request: &Request,
) -> Result<FetchDecision, FetchError> {
    if request.method != Method::GET || !config.is_same_origin(&request.url) {
        debug!(url = %request.url, method = %request.method, "Passing request through");
        return Ok(FetchDecision::Passthrough);
    }

    let key = CacheKey::for_request(request);
    if let Some(entry) = store.match_key(&config.generation, &key).await? {
        debug!(url = %request.url, "Serving from cache");
        return Ok(FetchDecision::Respond(entry.to_response()?));
    }

    match network.fetch(request).await {
        Ok(response) => {
            debug!(url = %request.url, status = %response.status, "Serving from network");
            Ok(FetchDecision::Respond(response))
        }
        Err(e) if request.is_navigation() => {
            let fallback = CacheKey::get(&config.fallback_url()?);
            match store.match_key(&config.generation, &fallback).await? {
                Some(entry) => {
                    warn!(url = %request.url, error = %e, "Network failed, serving offline page");
                    Ok(FetchDecision::Respond(entry.to_response()?))
                }
                None => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}
