//! In-memory cache store.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{keyed, CacheEntry, CacheError, CacheKey, CacheStorage, CacheStore};

/// Cache store kept entirely in memory.
///
/// Clones share the same storage, so a host can hand one clone to the
/// worker and keep another for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    storage: Arc<RwLock<CacheStorage>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the underlying storage.
    pub fn storage(&self) -> Arc<RwLock<CacheStorage>> {
        Arc::clone(&self.storage)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn generation_names(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.storage.read().await.names())
    }

    async fn put_batch(
        &self,
        generation: &str,
        entries: Vec<CacheEntry>,
    ) -> Result<(), CacheError> {
        let entries = keyed(entries)?;
        let count = entries.len();

        let mut storage = self.storage.write().await;
        let target = storage.open(generation);
        for (key, entry) in entries {
            target.put(key, entry);
        }

        debug!(generation, count, "Stored cache batch");
        Ok(())
    }

    async fn match_key(
        &self,
        generation: &str,
        key: &CacheKey,
    ) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self
            .storage
            .read()
            .await
            .get(generation)
            .and_then(|g| g.match_key(key))
            .cloned())
    }

    async fn entry_keys(&self, generation: &str) -> Result<Vec<CacheKey>, CacheError> {
        self.storage
            .read()
            .await
            .get(generation)
            .map(|g| g.keys())
            .ok_or_else(|| CacheError::GenerationNotFound(generation.to_string()))
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool, CacheError> {
        Ok(self.storage.write().await.delete(generation))
    }

    async fn has_generation(&self, generation: &str) -> Result<bool, CacheError> {
        Ok(self.storage.read().await.has(generation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use spyder_net::{Request, Response};
    use url::Url;

    fn entry(url: &str) -> CacheEntry {
        let url = Url::parse(url).unwrap();
        CacheEntry::from_response(
            &Request::get(url.clone()),
            &Response::new(url, StatusCode::OK, "x"),
        )
    }

    #[tokio::test]
    async fn test_put_batch_creates_generation() {
        let store = MemoryCacheStore::new();
        store
            .put_batch(
                "v1",
                vec![entry("https://example.com/"), entry("https://example.com/a.js")],
            )
            .await
            .unwrap();

        assert!(store.has_generation("v1").await.unwrap());
        assert_eq!(store.entry_keys("v1").await.unwrap().len(), 2);

        let key = CacheKey::get(&Url::parse("https://example.com/a.js").unwrap());
        assert!(store.match_key("v1", &key).await.unwrap().is_some());
        assert!(store.match_key("v0", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_entry_rejects_whole_batch() {
        let store = MemoryCacheStore::new();
        let mut bad = entry("https://example.com/b.js");
        bad.url = "::not a url::".to_string();

        let result = store
            .put_batch("v1", vec![entry("https://example.com/a.js"), bad])
            .await;

        assert!(matches!(result, Err(CacheError::CorruptEntry { .. })));
        assert!(!store.has_generation("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_generation() {
        let store = MemoryCacheStore::new();
        store
            .put_batch("v1", vec![entry("https://example.com/")])
            .await
            .unwrap();

        assert!(store.delete_generation("v1").await.unwrap());
        assert!(!store.delete_generation("v1").await.unwrap());
        assert!(store.generation_names().await.unwrap().is_empty());
        assert!(matches!(
            store.entry_keys("v1").await,
            Err(CacheError::GenerationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let store = MemoryCacheStore::new();
        let observer = store.clone();
        store
            .put_batch("v2", vec![entry("https://example.com/")])
            .await
            .unwrap();
        assert_eq!(observer.generation_names().await.unwrap(), vec!["v2"]);
    }
}
