//! # Spyder Cache
//!
//! Versioned cache generations for the Spyder offline worker.
//!
//! ## Architecture
//!
//! ```text
//! CacheStore (trait, async)
//!     ├── MemoryCacheStore ── Arc<RwLock<CacheStorage>>
//!     └── DiskCacheStore ──── <dir>/<generation>.json + in-memory mirror
//!
//! CacheStorage
//!     └── CacheGeneration ("spydernet-app-v13.5.5")
//!             └── CacheKey ("GET https://…") → CacheEntry
//! ```
//!
//! A generation is written once, in a single batch, and afterwards only
//! read or deleted as a whole.

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use spyder_net::{Request, Response, ResponseSource};
use std::fmt;
use thiserror::Error;
use url::Url;

mod body;
pub mod disk;
mod header_values;
pub mod memory;

pub use disk::DiskCacheStore;
pub use memory::MemoryCacheStore;

// ==================== Errors ====================

/// Errors raised by cache stores.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache generation not found: {0}")]
    GenerationNotFound(String),

    #[error("Corrupt cache entry for {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ==================== Keys ====================

/// Request identity inside a generation: method plus absolute URL.
///
/// The fragment never reaches the server, so it is not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(format!("{} {}", method.as_str(), url.as_str()))
    }

    /// Key for a GET of `url`.
    pub fn get(url: &Url) -> Self {
        Self::new(&Method::GET, url)
    }

    pub fn for_request(request: &Request) -> Self {
        Self::new(&request.method, &request.url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ==================== Entries ====================

/// A stored response snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers in wire order; repeated names appear repeatedly.
    /// Values are kept as raw bytes.
    #[serde(with = "header_values")]
    pub headers: Vec<(String, Bytes)>,

    /// Response body.
    #[serde(with = "body")]
    pub body: Bytes,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a network response for `request`.
    pub fn from_response(request: &Request, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    Bytes::copy_from_slice(value.as_bytes()),
                )
            })
            .collect();

        Self {
            url: request.url.to_string(),
            method: request.method.as_str().to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body.clone(),
            cached_at: spyder_common::now_millis(),
        }
    }

    pub fn key(&self) -> Result<CacheKey, CacheError> {
        let url = Url::parse(&self.url).map_err(|e| self.corrupt(e))?;
        let method = Method::from_bytes(self.method.as_bytes()).map_err(|e| self.corrupt(e))?;
        Ok(CacheKey::new(&method, &url))
    }

    /// Rebuild the stored response exactly as it was cached.
    pub fn to_response(&self) -> Result<Response, CacheError> {
        let url = Url::parse(&self.url).map_err(|e| self.corrupt(e))?;
        let status = StatusCode::from_u16(self.status).map_err(|e| self.corrupt(e))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| self.corrupt(e))?;
            let value =
                HeaderValue::from_maybe_shared(value.clone()).map_err(|e| self.corrupt(e))?;
            headers.append(name, value);
        }

        Ok(Response {
            url,
            status,
            headers,
            body: self.body.clone(),
            source: ResponseSource::Cache,
        })
    }

    fn corrupt(&self, reason: impl fmt::Display) -> CacheError {
        CacheError::CorruptEntry {
            key: format!("{} {}", self.method, self.url),
            reason: reason.to_string(),
        }
    }
}

// ==================== Generations ====================

/// One versioned set of stored responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheGeneration {
    /// Generation name (the version tag).
    pub name: String,

    entries: HashMap<CacheKey, CacheEntry>,
}

impl CacheGeneration {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    pub fn match_key(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn put(&mut self, key: CacheKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    /// Sorted keys.
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// All generations of one origin.
#[derive(Debug, Default)]
pub struct CacheStorage {
    generations: HashMap<String, CacheGeneration>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a generation, creating it if absent.
    pub fn open(&mut self, name: &str) -> &mut CacheGeneration {
        self.generations
            .entry(name.to_string())
            .or_insert_with(|| CacheGeneration::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&CacheGeneration> {
        self.generations.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.generations.contains_key(name)
    }

    pub fn insert(&mut self, generation: CacheGeneration) {
        self.generations.insert(generation.name.clone(), generation);
    }

    pub fn delete(&mut self, name: &str) -> bool {
        self.generations.remove(name).is_some()
    }

    /// Sorted generation names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.generations.keys().cloned().collect();
        names.sort();
        names
    }
}

// ==================== Store seam ====================

/// Persistent cache API as seen by the worker.
///
/// Stores are shared between concurrently running handlers; each call is
/// atomic with respect to the others.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Names of every generation present.
    async fn generation_names(&self) -> Result<Vec<String>, CacheError>;

    /// Insert `entries` into `generation`, creating it if absent.
    ///
    /// Either every entry becomes visible or none does.
    async fn put_batch(&self, generation: &str, entries: Vec<CacheEntry>)
        -> Result<(), CacheError>;

    /// Look up one key. A missing generation is a miss.
    async fn match_key(
        &self,
        generation: &str,
        key: &CacheKey,
    ) -> Result<Option<CacheEntry>, CacheError>;

    /// Keys stored in `generation`.
    async fn entry_keys(&self, generation: &str) -> Result<Vec<CacheKey>, CacheError>;

    /// Delete a whole generation. Returns whether it existed.
    async fn delete_generation(&self, generation: &str) -> Result<bool, CacheError>;

    async fn has_generation(&self, generation: &str) -> Result<bool, CacheError> {
        Ok(self
            .generation_names()
            .await?
            .iter()
            .any(|name| name == generation))
    }
}

/// Key every entry up front so a bad entry rejects the whole batch.
pub(crate) fn keyed(entries: Vec<CacheEntry>) -> Result<Vec<(CacheKey, CacheEntry)>, CacheError> {
    entries
        .into_iter()
        .map(|entry| entry.key().map(|key| (key, entry)))
        .collect()
}
