//! Request classification.

use shellkit_net::Request;
use tracing::trace;

/// Where an intercepted request goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Leave the request to the host's default networking.
    Bypass,
    /// Navigations: network raced against a timeout, app shell fallback.
    NetworkFirst,
    /// Scripts, styles, images: serve cached, refresh in the background.
    StaleWhileRevalidate,
    /// Everything else: cache, then network.
    CacheFirst,
}

impl Route {
    pub fn name(&self) -> &'static str {
        match self {
            Route::Bypass => "bypass",
            Route::NetworkFirst => "network-first",
            Route::StaleWhileRevalidate => "stale-while-revalidate",
            Route::CacheFirst => "cache-first",
        }
    }
}

/// Classifies requests in strict priority order; first match wins.
#[derive(Debug, Clone)]
pub struct Router {
    backend_host: String,
}

impl Router {
    pub fn new(backend_host: impl Into<String>) -> Self {
        Self {
            backend_host: backend_host.into(),
        }
    }

    pub fn classify(&self, request: &Request) -> Route {
        let route = if !self.backend_host.is_empty() && request.host_contains(&self.backend_host) {
            Route::Bypass
        } else if request.is_navigation() {
            Route::NetworkFirst
        } else if request.destination.is_subresource_asset() {
            Route::StaleWhileRevalidate
        } else {
            Route::CacheFirst
        };

        trace!(url = %request.url, route = route.name(), "Classified request");
        route
    }
}
