//! # Shellkit Net
//!
//! Request/response model and network fetching for the offline shell worker.
//!
//! ## Design Goals
//!
//! 1. **Browser-shaped requests**: mode and destination travel with every request
//!    so the worker can route on them
//! 2. **Cheap snapshots**: responses hold their body as [`Bytes`] and clone freely
//!    into cache partitions
//! 3. **One network seam**: everything that touches the network goes through
//!    [`Fetcher`], so strategies can be driven by scripted fetchers in tests

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub mod fetcher;

pub use fetcher::{Fetcher, HttpFetcher, LoaderConfig};

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Request mode, as reported by the page that issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level navigation.
    Navigate,
    /// Same-origin only.
    SameOrigin,
    /// No CORS (sub-resource loads).
    #[default]
    NoCors,
    /// CORS.
    Cors,
}

/// What the requested resource will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestDestination {
    /// `fetch()` / XHR and anything unclassified.
    #[default]
    Empty,
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    Worker,
    Audio,
    Video,
}

impl RequestDestination {
    /// Scripts, stylesheets, and images.
    pub fn is_subresource_asset(&self) -> bool {
        matches!(self, Self::Script | Self::Style | Self::Image)
    }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub mode: RequestMode,
    pub destination: RequestDestination,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            mode: RequestMode::default(),
            destination: RequestDestination::default(),
        }
    }

    /// Create a top-level navigation request.
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            destination: RequestDestination::Document,
            ..Self::get(url)
        }
    }

    /// Parse a URL and create a GET request for it.
    pub fn parse(url: &str) -> Result<Self, NetError> {
        let url = Url::parse(url).map_err(|e| NetError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self::get(url))
    }

    /// Set the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the mode.
    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the destination.
    pub fn destination(mut self, destination: RequestDestination) -> Self {
        self.destination = destination;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Whether this is a navigation request.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Whether the request's hostname contains `needle`.
    pub fn host_contains(&self, needle: &str) -> bool {
        self.url
            .host_str()
            .is_some_and(|host| host.contains(needle))
    }
}

/// Response type, following the fetch standard's tainting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response.
    #[default]
    Basic,
    /// Cross-origin response with CORS.
    Cors,
    /// Cross-origin response without CORS.
    Opaque,
    /// Network error.
    Error,
}

/// A response snapshot. Bodies are fully buffered.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Option<Url>,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub response_type: ResponseType,
    /// Whether this response was served from a cache partition.
    pub from_cache: bool,
}

impl Response {
    /// Create a response.
    pub fn new(url: Url, status: u16, response_type: ResponseType, body: impl Into<Bytes>) -> Self {
        Self {
            url: Some(url),
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            response_type,
            from_cache: false,
        }
    }

    /// Create a same-origin response.
    pub fn basic(url: Url, status: u16, body: impl Into<Bytes>) -> Self {
        Self::new(url, status, ResponseType::Basic, body)
    }

    /// Create a network error response.
    pub fn network_error() -> Self {
        Self {
            url: None,
            status: 0,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            response_type: ResponseType::Error,
            from_cache: false,
        }
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Check if the response was successful (2xx).
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether this is a network error.
    pub fn is_network_error(&self) -> bool {
        self.response_type == ResponseType::Error
    }

    /// Only same-origin 200 responses may be written to the runtime cache.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.response_type == ResponseType::Basic
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}
