//! Worker configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shellkit_common::SwKitError;
use url::Url;

/// What to do when a precache asset cannot be fetched during install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallPolicy {
    /// Log the failure, keep whatever was fetched, and finish installing.
    #[default]
    Lenient,
    /// Write nothing and fail the install.
    Strict,
}

/// Worker configuration
///
/// `scope` is required; every other field falls back to its default when
/// absent from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Scope the worker controls; relative paths resolve against it
    pub scope: Url,

    /// Cache generation token. Bump it whenever the manifest or a
    /// strategy changes so activation evicts the previous generation.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Name prefix of the app-shell partition
    #[serde(default = "default_static_cache_prefix")]
    pub static_cache_prefix: String,

    /// Name prefix of the runtime partition
    #[serde(default = "default_dynamic_cache_prefix")]
    pub dynamic_cache_prefix: String,

    /// Paths precached at install, in order
    #[serde(default = "default_precache_manifest")]
    pub precache_manifest: Vec<String>,

    /// Requests whose hostname contains this are never intercepted
    #[serde(default = "default_backend_host")]
    pub backend_host: String,

    /// How long a navigation waits on the network before falling back
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// Cached document served when a navigation cannot reach the network
    #[serde(default = "default_app_shell_path")]
    pub app_shell_path: String,

    /// Last-resort document when the app shell is not cached either
    #[serde(default = "default_offline_page_path")]
    pub offline_page_path: String,

    /// Cached asset served when a cache-first fetch fails on the network
    #[serde(default)]
    pub fallback_asset: Option<String>,

    #[serde(default)]
    pub install_policy: InstallPolicy,

    #[serde(default = "default_notification_title")]
    pub default_notification_title: String,

    #[serde(default = "default_notification_icon")]
    pub default_notification_icon: Option<String>,

    /// Background sync tag that triggers a replay of queued writes
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,
}

fn default_cache_version() -> String {
    "v2".to_string()
}

fn default_static_cache_prefix() -> String {
    "static".to_string()
}

fn default_dynamic_cache_prefix() -> String {
    "dynamic".to_string()
}

fn default_precache_manifest() -> Vec<String> {
    ["/", "/index.html", "/manifest.json", "/offline.html"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_backend_host() -> String {
    "supabase.co".to_string()
}

fn default_navigation_timeout_ms() -> u64 {
    2000
}

fn default_app_shell_path() -> String {
    "/index.html".to_string()
}

fn default_offline_page_path() -> String {
    "/offline.html".to_string()
}

fn default_notification_title() -> String {
    "SpeakLife".to_string()
}

fn default_notification_icon() -> Option<String> {
    Some("/icon-192.png".to_string())
}

fn default_sync_tag() -> String {
    "sync-data".to_string()
}

impl WorkerConfig {
    /// Default configuration for a worker controlling `scope`.
    pub fn for_scope(scope: Url) -> Self {
        Self {
            scope,
            cache_version: default_cache_version(),
            static_cache_prefix: default_static_cache_prefix(),
            dynamic_cache_prefix: default_dynamic_cache_prefix(),
            precache_manifest: default_precache_manifest(),
            backend_host: default_backend_host(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            app_shell_path: default_app_shell_path(),
            offline_page_path: default_offline_page_path(),
            fallback_asset: None,
            install_policy: InstallPolicy::default(),
            default_notification_title: default_notification_title(),
            default_notification_icon: default_notification_icon(),
            sync_tag: default_sync_tag(),
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, SwKitError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SwKitError::config_with_source("invalid worker config JSON", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SwKitError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            SwKitError::config_with_source(format!("cannot read {}", path.display()), e)
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), SwKitError> {
        if self.cache_version.trim().is_empty() {
            return Err(SwKitError::config("cache_version must not be empty"));
        }
        if self.static_cache_prefix == self.dynamic_cache_prefix {
            return Err(SwKitError::config(
                "static and dynamic cache prefixes must differ",
            ));
        }
        if self.backend_host.trim().is_empty() {
            return Err(SwKitError::config("backend_host must not be empty"));
        }
        if self.navigation_timeout_ms == 0 {
            return Err(SwKitError::config("navigation_timeout_ms must be positive"));
        }
        if let Some(bad) = self.precache_manifest.iter().find(|p| !p.starts_with('/')) {
            return Err(SwKitError::config(format!(
                "precache entry {bad:?} must be an absolute path"
            )));
        }
        Ok(())
    }

    /// Name of the current static generation, e.g. `static-v2`.
    pub fn static_cache_name(&self) -> String {
        format!("{}-{}", self.static_cache_prefix, self.cache_version)
    }

    /// Name of the current dynamic generation, e.g. `dynamic-v2`.
    pub fn dynamic_cache_name(&self) -> String {
        format!("{}-{}", self.dynamic_cache_prefix, self.cache_version)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// Resolve a path or URL against the worker scope.
    pub fn resolve(&self, path: &str) -> Result<Url, SwKitError> {
        self.scope
            .join(path)
            .map_err(|e| SwKitError::InvalidArgument(format!("{path}: {e}")))
    }
}
