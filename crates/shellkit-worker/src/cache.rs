//! Cache storage and the static/dynamic partitions built on it.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, Method};
use shellkit_net::{Request, Response, ResponseType};
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

use crate::{Result, ServiceWorkerError};

/// Origin-wide cache storage, shared by every worker generation.
pub type SharedCacheStorage = Arc<RwLock<CacheStorage>>;

// ==================== Cache ====================

/// Lookup key: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    url: String,
}

impl CacheKey {
    fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.clone(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Request URL.
    pub url: Url,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HeaderMap,

    /// Response body.
    pub body: Bytes,

    pub response_type: ResponseType,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    fn snapshot(url: &Url, response: &Response) -> Self {
        Self {
            url: url.clone(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            response_type: response.response_type,
            cached_at: now_millis(),
        }
    }

    /// Rebuild a response from this entry.
    pub fn to_response(&self) -> Response {
        Response {
            url: Some(self.url.clone()),
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            response_type: self.response_type,
            from_cache: true,
        }
    }
}

/// A named cache.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    entries: HashMap<CacheKey, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        self.entries.get(&CacheKey::new(&request.method, &request.url))
    }

    /// Match a GET for `url`.
    pub fn match_url(&self, url: &Url) -> Option<&CacheEntry> {
        self.entries.get(&CacheKey::new(&Method::GET, url))
    }

    /// Store a response, replacing any entry under the same key.
    pub fn put(&mut self, request: &Request, response: &Response) -> Result<()> {
        if request.method != Method::GET {
            return Err(ServiceWorkerError::CacheError(format!(
                "cannot cache {} {}",
                request.method, request.url
            )));
        }
        let key = CacheKey::new(&request.method, &request.url);
        self.entries
            .insert(key, CacheEntry::snapshot(&request.url, response));
        Ok(())
    }

    /// Delete entry.
    pub fn delete(&mut self, url: &Url) -> bool {
        self.entries
            .remove(&CacheKey::new(&Method::GET, url))
            .is_some()
    }

    /// Get all keys (URLs).
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(CacheKey::url).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// Cache storage (the `caches` global). Caches keep creation order.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
    order: Vec<String>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create new storage ready to be shared across worker generations.
    pub fn shared() -> SharedCacheStorage {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        if !self.caches.contains_key(name) {
            trace!(cache = name, "Creating cache");
            self.order.push(name.to_string());
        }
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.order.retain(|n| n != name);
        self.caches.remove(name).is_some()
    }

    /// Cache names in creation order.
    pub fn keys(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Match across all caches, oldest cache first.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        self.order
            .iter()
            .filter_map(|name| self.caches.get(name))
            .find_map(|cache| cache.match_request(request))
    }

    /// Match a GET for `url` across all caches.
    pub fn match_url(&self, url: &Url) -> Option<&CacheEntry> {
        self.order
            .iter()
            .filter_map(|name| self.caches.get(name))
            .find_map(|cache| cache.match_url(url))
    }
}

// ==================== Partitions ====================

/// The two versioned partitions the worker reads and writes.
#[derive(Debug, Clone)]
pub struct CacheStore {
    storage: SharedCacheStorage,
    static_name: String,
    dynamic_name: String,
}

impl CacheStore {
    pub fn new(
        storage: SharedCacheStorage,
        static_name: impl Into<String>,
        dynamic_name: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            static_name: static_name.into(),
            dynamic_name: dynamic_name.into(),
        }
    }

    pub fn static_name(&self) -> &str {
        &self.static_name
    }

    pub fn dynamic_name(&self) -> &str {
        &self.dynamic_name
    }

    pub fn storage(&self) -> &SharedCacheStorage {
        &self.storage
    }

    /// Look the request up in every cache.
    pub async fn match_any(&self, request: &Request) -> Option<Response> {
        let storage = self.storage.read().await;
        storage.match_request(request).map(CacheEntry::to_response)
    }

    /// Look a GET for `url` up in every cache.
    pub async fn match_url(&self, url: &Url) -> Option<Response> {
        let storage = self.storage.read().await;
        storage.match_url(url).map(CacheEntry::to_response)
    }

    /// Look the request up in the dynamic partition only.
    pub async fn match_dynamic(&self, request: &Request) -> Option<Response> {
        let storage = self.storage.read().await;
        storage
            .get(&self.dynamic_name)
            .and_then(|cache| cache.match_request(request))
            .map(CacheEntry::to_response)
    }

    /// Write through to the dynamic partition.
    ///
    /// Only same-origin 200 responses to GET requests are stored; anything
    /// else is skipped. Returns whether the entry was written.
    pub async fn put_dynamic(&self, request: &Request, response: &Response) -> bool {
        if request.method != Method::GET || !response.is_cacheable() {
            trace!(
                url = %request.url,
                status = response.status,
                response_type = ?response.response_type,
                "Not caching response"
            );
            return false;
        }

        let mut storage = self.storage.write().await;
        match storage.open(&self.dynamic_name).put(request, response) {
            Ok(()) => {
                debug!(url = %request.url, cache = %self.dynamic_name, "Cached response");
                true
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Cache write rejected");
                false
            }
        }
    }

    /// Write a batch into the static partition under one lock.
    pub async fn put_static(&self, entries: &[(Request, Response)]) -> Result<()> {
        let mut storage = self.storage.write().await;
        let cache = storage.open(&self.static_name);
        for (request, response) in entries {
            cache.put(request, response)?;
        }
        Ok(())
    }

    /// Make sure both current partitions exist.
    pub async fn ensure_partitions(&self) {
        let mut storage = self.storage.write().await;
        storage.open(&self.static_name);
        storage.open(&self.dynamic_name);
    }

    pub async fn cache_names(&self) -> Vec<String> {
        self.storage.read().await.keys()
    }

    pub async fn delete_cache(&self, name: &str) -> bool {
        self.storage.write().await.delete(name)
    }

    /// Number of entries in the named cache, if it exists.
    pub async fn entry_count(&self, name: &str) -> Option<usize> {
        self.storage.read().await.get(name).map(Cache::len)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
