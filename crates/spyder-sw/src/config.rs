//! Worker configuration.
//!
//! Everything the worker used to read from module-level constants (the
//! cache version tag, the asset list, the offline page) is injected here,
//! so one process can run several generations side by side.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::manifest::AssetManifest;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Generation name must not be empty")]
    EmptyGeneration,

    #[error("Origin must be a hierarchical http(s) URL: {0}")]
    InvalidOrigin(String),

    #[error("Invalid URL {entry:?}: {reason}")]
    InvalidUrl { entry: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a notification click picks an existing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickMatch {
    /// Any window showing the application root page.
    #[default]
    Root,
    /// Only a window showing exactly the notification's target URL.
    Exact,
}

/// Presentation defaults for notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub default_title: String,
    pub default_body: String,
    pub default_icon: String,
    pub badge: String,
    /// Re-alert when a notification replaces one with the same tag.
    pub renotify: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_title: "Spyder".to_string(),
            default_body: "You have a new notification.".to_string(),
            default_icon: "/assets/icon.png".to_string(),
            badge: "/assets/badge.png".to_string(),
            renotify: true,
        }
    }
}

fn default_offline_fallback() -> String {
    "/index.html".to_string()
}

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name of the current cache generation, e.g. `spydernet-app-v13.5.5`.
    pub generation: String,

    /// Origin the worker serves. Only same-origin requests are intercepted.
    pub origin: Url,

    /// Assets pre-cached on install.
    #[serde(default)]
    pub manifest: AssetManifest,

    /// Cached document served to navigations when the network is down.
    #[serde(default = "default_offline_fallback")]
    pub offline_fallback: String,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub click_match: ClickMatch,
}

impl WorkerConfig {
    /// Configuration with an empty manifest and default notification policy.
    pub fn new(generation: impl Into<String>, origin: Url) -> Self {
        Self {
            generation: generation.into(),
            origin,
            manifest: AssetManifest::default(),
            offline_fallback: default_offline_fallback(),
            notifications: NotificationConfig::default(),
            click_match: ClickMatch::default(),
        }
    }

    pub fn with_manifest(mut self, manifest: AssetManifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_generation(mut self, generation: impl Into<String>) -> Self {
        self.generation = generation.into();
        self
    }

    pub fn with_offline_fallback(mut self, path: impl Into<String>) -> Self {
        self.offline_fallback = path.into();
        self
    }

    pub fn with_renotify(mut self, renotify: bool) -> Self {
        self.notifications.renotify = renotify;
        self
    }

    pub fn with_click_match(mut self, click_match: ClickMatch) -> Self {
        self.click_match = click_match;
        self
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check everything that would otherwise only fail at install time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.trim().is_empty() {
            return Err(ConfigError::EmptyGeneration);
        }
        if self.origin.cannot_be_a_base() || !matches!(self.origin.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidOrigin(self.origin.to_string()));
        }
        self.manifest.resolve(&self.origin)?;
        self.fallback_url()?;
        Ok(())
    }

    /// Resolve a path or absolute URL against the origin.
    pub fn resolve(&self, entry: &str) -> Result<Url, ConfigError> {
        self.origin.join(entry).map_err(|e| ConfigError::InvalidUrl {
            entry: entry.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn fallback_url(&self) -> Result<Url, ConfigError> {
        self.resolve(&self.offline_fallback)
    }

    /// Whether `url` belongs to the worker's origin.
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }
}
