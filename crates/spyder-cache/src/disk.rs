//! Cache store persisted as one JSON document per generation.
//!
//! Documents are replaced atomically (write to a temp file, then rename),
//! so a crash mid-write leaves either the old or the new generation on
//! disk, never a torn one. Reads are served from an in-memory mirror that
//! is loaded when the store is opened.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{keyed, CacheEntry, CacheError, CacheGeneration, CacheKey, CacheStorage, CacheStore};

const DOCUMENT_EXT: &str = "json";
const TEMP_SUFFIX: &str = ".tmp";

/// Disk-backed cache store.
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    root: PathBuf,
    mirror: Arc<RwLock<CacheStorage>>,
    /// Serializes writers so read-modify-write of a document is atomic.
    write_lock: Arc<Mutex<()>>,
}

impl DiskCacheStore {
    /// Open (creating if needed) a store rooted at `root` and load every
    /// generation found there.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let mut storage = CacheStorage::new();
        let mut dir = tokio::fs::read_dir(&root).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXT) {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<CacheGeneration>(&bytes) {
                Ok(generation) => storage.insert(generation),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable cache generation");
                }
            }
        }

        info!(root = %root.display(), generations = storage.names().len(), "DiskCacheStore opened");

        Ok(Self {
            root,
            mirror: Arc::new(RwLock::new(storage)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, generation: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", escape_name(generation), DOCUMENT_EXT))
    }

    async fn write_document(&self, generation: &CacheGeneration) -> Result<(), CacheError> {
        let path = self.document_path(&generation.name);
        let mut temp = path.clone().into_os_string();
        temp.push(TEMP_SUFFIX);
        let temp = PathBuf::from(temp);

        let bytes = serde_json::to_vec(generation)?;
        tokio::fs::write(&temp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), bytes = bytes.len(), "Wrote cache generation");
        Ok(())
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn generation_names(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.mirror.read().await.names())
    }

    async fn put_batch(
        &self,
        generation: &str,
        entries: Vec<CacheEntry>,
    ) -> Result<(), CacheError> {
        let entries = keyed(entries)?;
        let _guard = self.write_lock.lock().await;

        let mut updated = self
            .mirror
            .read()
            .await
            .get(generation)
            .cloned()
            .unwrap_or_else(|| CacheGeneration::new(generation));
        for (key, entry) in entries {
            updated.put(key, entry);
        }

        self.write_document(&updated).await?;
        self.mirror.write().await.insert(updated);
        Ok(())
    }

    async fn match_key(
        &self,
        generation: &str,
        key: &CacheKey,
    ) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self
            .mirror
            .read()
            .await
            .get(generation)
            .and_then(|g| g.match_key(key))
            .cloned())
    }

    async fn entry_keys(&self, generation: &str) -> Result<Vec<CacheKey>, CacheError> {
        self.mirror
            .read()
            .await
            .get(generation)
            .map(|g| g.keys())
            .ok_or_else(|| CacheError::GenerationNotFound(generation.to_string()))
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool, CacheError> {
        let _guard = self.write_lock.lock().await;

        if !self.mirror.read().await.has(generation) {
            return Ok(false);
        }

        match tokio::fs::remove_file(self.document_path(generation)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(self.mirror.write().await.delete(generation))
    }

    async fn has_generation(&self, generation: &str) -> Result<bool, CacheError> {
        Ok(self.mirror.read().await.has(generation))
    }
}

/// Map a generation name onto a portable file stem.
///
/// Lowercase ASCII letters, digits, `-`, `_` and `.` pass through; every
/// other byte, uppercase letters included, is written as `%XX`. Distinct
/// names stay distinct on case-insensitive file systems.
fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
