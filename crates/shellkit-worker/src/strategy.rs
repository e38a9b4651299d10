//! Caching strategies.
//!
//! Every strategy writes through only on success. Nothing is invalidated
//! here; stale generations are dropped wholesale at activation.

use std::sync::Arc;

use shellkit_common::{run_cancellable, with_timeout, SwKitError};
use shellkit_net::{Fetcher, Request, Response};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use crate::cache::CacheStore;
use crate::config::WorkerConfig;
use crate::router::Route;

/// Result of handling a fetch event.
#[derive(Debug, Clone)]
pub enum FetchDisposition {
    /// No response produced; the host performs the request itself.
    Passthrough,
    /// Respond with this.
    Respond(Response),
}

impl FetchDisposition {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchDisposition::Passthrough => None,
            FetchDisposition::Respond(response) => Some(response),
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchDisposition::Passthrough => None,
            FetchDisposition::Respond(response) => Some(response),
        }
    }
}

/// Everything a strategy needs. Cheap to clone into background tasks.
#[derive(Clone)]
pub struct StrategyContext {
    pub store: CacheStore,
    pub fetcher: Arc<dyn Fetcher>,
    pub config: Arc<WorkerConfig>,
    /// Background work the worker must wait on before it can be torn down.
    pub tracker: TaskTracker,
    pub shutdown: CancellationToken,
}

/// Run the strategy for `route`.
pub async fn execute(ctx: &StrategyContext, route: Route, request: Request) -> FetchDisposition {
    let response = match route {
        Route::Bypass => return FetchDisposition::Passthrough,
        Route::NetworkFirst => network_first(ctx, request).await,
        Route::StaleWhileRevalidate => stale_while_revalidate(ctx, request).await,
        Route::CacheFirst => cache_first(ctx, request).await,
    };
    FetchDisposition::Respond(response)
}

/// Race the network against the navigation timeout; fall back to the cached
/// app shell, then the offline page.
///
/// The network response is returned as-is and never cached. A network leg
/// that loses the race is dropped, which aborts the underlying request.
pub async fn network_first(ctx: &StrategyContext, request: Request) -> Response {
    let timeout = ctx.config.navigation_timeout();
    let race = with_timeout(timeout, || ctx.fetcher.fetch(&request));

    match run_cancellable(&ctx.shutdown, race).await.and_then(|r| r) {
        Ok(Ok(response)) => {
            trace!(url = %request.url, status = response.status, "Navigation served from network");
            return response;
        }
        Ok(Err(e)) => {
            warn!(url = %request.url, error = %e, "Navigation fetch failed");
        }
        Err(SwKitError::Timeout(_)) => {
            debug!(url = %request.url, ?timeout, "Navigation timed out, network leg cancelled");
        }
        Err(e) => {
            debug!(url = %request.url, error = %e, category = e.category(), "Navigation abandoned");
        }
    }

    offline_document(ctx).await
}

async fn offline_document(ctx: &StrategyContext) -> Response {
    for path in [&ctx.config.app_shell_path, &ctx.config.offline_page_path] {
        let Ok(url) = ctx.config.resolve(path) else {
            continue;
        };
        if let Some(cached) = ctx.store.match_url(&url).await {
            debug!(url = %url, "Serving cached fallback document");
            return cached;
        }
    }

    warn!("No cached app shell or offline page");
    Response::network_error()
}

/// Serve from the dynamic partition and refresh it in the background; on a
/// miss, wait for the network.
pub async fn stale_while_revalidate(ctx: &StrategyContext, request: Request) -> Response {
    if let Some(cached) = ctx.store.match_dynamic(&request).await {
        trace!(url = %request.url, "Serving stale copy, revalidating");
        spawn_revalidation(ctx, request);
        return cached;
    }

    match ctx.fetcher.fetch(&request).await {
        Ok(response) => {
            ctx.store.put_dynamic(&request, &response).await;
            response
        }
        Err(e) => {
            warn!(url = %request.url, error = %e, "Sub-resource fetch failed with nothing cached");
            Response::network_error()
        }
    }
}

fn spawn_revalidation(ctx: &StrategyContext, request: Request) {
    let ctx = ctx.clone();
    let tracker = ctx.tracker.clone();

    tracker.spawn(async move {
        let refreshed = run_cancellable(&ctx.shutdown, ctx.fetcher.fetch(&request)).await;
        match refreshed {
            Ok(Ok(response)) if response.status == 200 => {
                if ctx.store.put_dynamic(&request, &response).await {
                    debug!(url = %request.url, "Revalidated cached copy");
                }
            }
            Ok(Ok(response)) => {
                debug!(url = %request.url, status = response.status, "Revalidation not stored");
            }
            Ok(Err(e)) => {
                debug!(url = %request.url, error = %e, "Revalidation failed, keeping stale copy");
            }
            Err(_) => {
                trace!(url = %request.url, "Revalidation cancelled");
            }
        }
    });
}

/// Serve from any cache; otherwise fetch and write through.
///
/// A network failure yields the configured fallback asset when it is
/// cached, and an explicit network error otherwise.
pub async fn cache_first(ctx: &StrategyContext, request: Request) -> Response {
    if let Some(cached) = ctx.store.match_any(&request).await {
        trace!(url = %request.url, "Cache hit");
        return cached;
    }

    match ctx.fetcher.fetch(&request).await {
        Ok(response) => {
            ctx.store.put_dynamic(&request, &response).await;
            response
        }
        Err(e) => {
            warn!(url = %request.url, error = %e, "Fetch failed with nothing cached");
            fallback_asset(ctx).await.unwrap_or_else(Response::network_error)
        }
    }
}

async fn fallback_asset(ctx: &StrategyContext) -> Option<Response> {
    let path = ctx.config.fallback_asset.as_deref()?;
    let url = ctx.config.resolve(path).ok()?;
    ctx.store.match_url(&url).await
}
