//! The fixed list of assets pre-cached on install.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ConfigError;

/// Ordered asset list. Entries are absolute URLs or origin-relative paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetManifest(Vec<String>);

impl AssetManifest {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(entries.into_iter().map(Into::into).collect())
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve every entry against `origin`, dropping repeats.
    ///
    /// Order follows the first occurrence of each URL.
    pub fn resolve(&self, origin: &Url) -> Result<Vec<Url>, ConfigError> {
        let mut seen = HashSet::new();
        let mut urls = Vec::with_capacity(self.0.len());
        for entry in &self.0 {
            let url = origin.join(entry).map_err(|e| ConfigError::InvalidUrl {
                entry: entry.clone(),
                reason: e.to_string(),
            })?;
            if seen.insert(url.clone()) {
                urls.push(url);
            }
        }
        Ok(urls)
    }
}
