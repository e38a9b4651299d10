//! Lifecycle, routing and caching strategies, end to end.

mod common;

use std::time::Duration;

use common::{active_worker, build, config, init_tracing, url, ScriptedFetcher};
use shellkit_net::{Request, RequestDestination};
use shellkit_worker::{
    CacheStorage, FetchDisposition, InstallPolicy, ServiceWorker, ServiceWorkerError, WorkerConfig,
    WorkerState,
};

fn script(path: &str) -> Request {
    Request::get(url(path)).destination(RequestDestination::Script)
}

async fn respond(worker: &ServiceWorker, request: Request) -> shellkit_net::Response {
    worker
        .handle_fetch(request)
        .await
        .into_response()
        .expect("worker should respond")
}

// ==================== Lifecycle ====================

#[tokio::test]
async fn test_activation_leaves_only_current_generations() {
    init_tracing();
    let storage = CacheStorage::shared();
    {
        let mut caches = storage.write().await;
        caches.open("static-v1");
        caches.open("dynamic-v1");
        caches.open("dynamic-v2");
        caches.open("scratch");
    }

    let (worker, _events) = ServiceWorker::builder(config(), ScriptedFetcher::with_app_shell())
        .storage(storage)
        .build()
        .unwrap();
    worker.start().await.unwrap();

    let mut names = worker.caches().cache_names().await;
    names.sort();
    assert_eq!(names, vec!["dynamic-v2", "static-v2"]);
}

#[tokio::test]
async fn test_new_generation_evicts_previous_worker_caches() {
    let storage = CacheStorage::shared();
    let fetcher = ScriptedFetcher::with_app_shell();
    fetcher.respond("/data.json", 200, "{}");

    let v1 = WorkerConfig {
        cache_version: "v1".into(),
        ..config()
    };
    let (old, _) = ServiceWorker::builder(v1, fetcher.clone())
        .storage(storage.clone())
        .build()
        .unwrap();
    old.start().await.unwrap();
    respond(&old, Request::get(url("/data.json"))).await;
    assert_eq!(old.caches().entry_count("dynamic-v1").await, Some(1));

    let (new, _) = ServiceWorker::builder(config(), fetcher)
        .storage(storage)
        .build()
        .unwrap();
    assert_eq!(new.start().await.unwrap(), WorkerState::Active);

    let mut names = new.caches().cache_names().await;
    names.sort();
    assert_eq!(names, vec!["dynamic-v2", "static-v2"]);
}

#[tokio::test]
async fn test_reinstall_never_duplicates_entries() {
    let (worker, _) = build(config(), ScriptedFetcher::with_app_shell());

    worker.install().await.unwrap();
    assert_eq!(worker.caches().entry_count("static-v2").await, Some(4));

    worker.install().await.unwrap();
    assert_eq!(worker.caches().entry_count("static-v2").await, Some(4));
    assert_eq!(worker.state().await, WorkerState::Installed);
}

#[tokio::test]
async fn test_lenient_install_keeps_partial_precache() {
    let fetcher = ScriptedFetcher::with_app_shell();
    fetcher.respond("/manifest.json", 404, "not found");

    let (worker, _) = build(config(), fetcher);
    let report = worker.install().await.unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "/manifest.json");
    assert_eq!(worker.caches().entry_count("static-v2").await, Some(3));
    assert_eq!(worker.state().await, WorkerState::Installed);
}

#[tokio::test]
async fn test_strict_install_writes_nothing() {
    let fetcher = ScriptedFetcher::with_app_shell();
    fetcher.fail("/offline.html");
    let strict = WorkerConfig {
        install_policy: InstallPolicy::Strict,
        ..config()
    };

    let (worker, _) = build(strict, fetcher);
    let err = worker.install().await.unwrap_err();

    assert!(matches!(
        err,
        ServiceWorkerError::InstallFailed(ref msg) if msg.contains("/offline.html")
    ));
    assert_eq!(worker.caches().entry_count("static-v2").await.unwrap_or(0), 0);
    assert_eq!(worker.state().await, WorkerState::Redundant);
    assert!(worker.activate().await.is_err());
}

#[tokio::test]
async fn test_fetch_before_activation_passes_through() {
    let fetcher = ScriptedFetcher::with_app_shell();
    let (worker, _) = build(config(), fetcher.clone());

    let request = Request::navigate(url("/journal"));
    assert!(matches!(
        worker.handle_fetch(request.clone()).await,
        FetchDisposition::Passthrough
    ));

    worker.install().await.unwrap();
    assert!(matches!(
        worker.handle_fetch(request).await,
        FetchDisposition::Passthrough
    ));
    assert_eq!(fetcher.calls("/journal"), 0);
}

// ==================== Routing ====================

#[tokio::test]
async fn test_backend_requests_pass_through() {
    let fetcher = ScriptedFetcher::with_app_shell();
    let (worker, _) = active_worker(fetcher.clone()).await;

    let backend = url("https://xyz.supabase.co/rest/v1/affirmations");
    let disposition = worker.handle_fetch(Request::get(backend.clone())).await;

    assert!(matches!(disposition, FetchDisposition::Passthrough));
    assert_eq!(fetcher.calls_for(&backend), 0);
}

// ==================== Network first ====================

#[tokio::test]
async fn test_navigation_prefers_network() {
    let fetcher = ScriptedFetcher::with_app_shell();
    fetcher.respond("/journal", 200, "<html>journal</html>");
    let (worker, _) = active_worker(fetcher).await;

    let response = respond(&worker, Request::navigate(url("/journal"))).await;

    assert_eq!(response.text().unwrap(), "<html>journal</html>");
    assert!(!response.from_cache);
    assert_eq!(worker.caches().entry_count("dynamic-v2").await, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_slow_navigation_falls_back_to_app_shell() {
    let fetcher = ScriptedFetcher::with_app_shell();
    fetcher.respond("/journal", 200, "<html>journal</html>");
    fetcher.delay("/journal", Duration::from_secs(5));
    let (worker, _) = active_worker(fetcher.clone()).await;

    let started = tokio::time::Instant::now();
    let response = respond(&worker, Request::navigate(url("/journal"))).await;

    assert_eq!(response.text().unwrap(), "<html>app shell</html>");
    assert!(response.from_cache);
    assert!(started.elapsed() < Duration::from_secs(5));

    // The losing network leg was dropped, not left running.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(fetcher.calls("/journal"), 1);
    assert_eq!(fetcher.completed("/journal"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_within_timeout_uses_network() {
    let fetcher = ScriptedFetcher::with_app_shell();
    fetcher.respond("/journal", 200, "<html>journal</html>");
    fetcher.delay("/journal", Duration::from_millis(1500));
    let (worker, _) = active_worker(fetcher).await;

    let response = respond(&worker, Request::navigate(url("/journal"))).await;
    assert_eq!(response.text().unwrap(), "<html>journal</html>");
}

#[tokio::test]
async fn test_offline_navigation_without_app_shell_serves_offline_page() {
    let fetcher = ScriptedFetcher::with_app_shell();
    fetcher.fail("/index.html");
    let (worker, _) = active_worker(fetcher).await;

    let response = respond(&worker, Request::navigate(url("/journal"))).await;
    assert_eq!(response.text().unwrap(), "<html>offline</html>");
}

#[tokio::test]
async fn test_offline_navigation_with_empty_cache_is_network_error() {
    let (worker, _) = active_worker(ScriptedFetcher::new()).await;

    let response = respond(&worker, Request::navigate(url("/journal"))).await;
    assert!(response.is_network_error());
    assert_eq!(response.status, 0);
}

// ==================== Stale while revalidate ====================

#[tokio::test(start_paused = true)]
async fn test_stale_copy_served_then_refreshed() {
    let fetcher = ScriptedFetcher::with_app_shell();
    fetcher.respond("/app.js", 200, "console.log(1)");
    let (worker, _) = active_worker(fetcher.clone()).await;

    let first = respond(&worker, script("/app.js")).await;
    assert_eq!(first.text().unwrap(), "console.log(1)");
    assert!(!first.from_cache);

    fetcher.respond("/app.js", 200, "console.log(2)");
    fetcher.delay("/app.js", Duration::from_secs(3));

    let started = tokio::time::Instant::now();
    let stale = respond(&worker, script("/app.js")).await;
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(stale.text().unwrap(), "console.log(1)");
    assert!(stale.from_cache);

    worker.settle().await;
    assert_eq!(fetcher.completed("/app.js"), 2);

    let fresh = respond(&worker, script("/app.js")).await;
    assert_eq!(fresh.text().unwrap(), "console.log(2)");
    worker.settle().await;
}

#[tokio::test]
async fn test_failed_revalidation_keeps_stale_copy() {
    let fetcher = ScriptedFetcher::with_app_shell();
    fetcher.respond("/style.css", 200, "body{}");
    let (worker, _) = active_worker(fetcher.clone()).await;
    respond(&worker, script("/style.css")).await;

    fetcher.fail("/style.css");
    respond(&worker, script("/style.css")).await;
    worker.settle().await;

    fetcher.respond("/style.css", 500, "oops");
    respond(&worker, script("/style.css")).await;
    worker.settle().await;

    let cached = respond(&worker, script("/style.css")).await;
    assert_eq!(cached.text().unwrap(), "body{}");
    worker.settle().await;
}

#[tokio::test]
async fn test_uncached_subresource_failure_is_network_error() {
    let (worker, _) = active_worker(ScriptedFetcher::with_app_shell()).await;

    let response = respond(&worker, script("/missing.js")).await;
    assert!(response.is_network_error());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_revalidation() {
    let fetcher = ScriptedFetcher::with_app_shell();
    fetcher.respond("/logo.png", 200, "png-v1");
    let (worker, _) = active_worker(fetcher.clone()).await;

    let image = || Request::get(url("/logo.png")).destination(RequestDestination::Image);
    respond(&worker, image()).await;

    fetcher.respond("/logo.png", 200, "png-v2");
    fetcher.delay("/logo.png", Duration::from_secs(60));
    respond(&worker, image()).await;

    let started = tokio::time::Instant::now();
    worker.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(fetcher.completed("/logo.png"), 1);
}

// ==================== Cache first ====================

#[tokio::test]
async fn test_cache_first_writes_through_once() {
    let fetcher = ScriptedFetcher::with_app_shell();
    fetcher.respond("/fonts/inter.woff2", 200, "font");
    let (worker, _) = active_worker(fetcher.clone()).await;

    let font = || Request::get(url("/fonts/inter.woff2")).destination(RequestDestination::Font);
    let first = respond(&worker, font()).await;
    let second = respond(&worker, font()).await;

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(second.text().unwrap(), "font");
    assert_eq!(fetcher.calls("/fonts/inter.woff2"), 1);
}

#[tokio::test]
async fn test_cache_first_serves_precached_assets() {
    let fetcher = ScriptedFetcher::with_app_shell();
    let (worker, _) = active_worker(fetcher.clone()).await;

    let response = respond(&worker, Request::get(url("/manifest.json"))).await;
    assert!(response.from_cache);
    assert_eq!(fetcher.calls("/manifest.json"), 1);
}

#[tokio::test]
async fn test_cross_origin_and_errors_never_cached() {
    let fetcher = ScriptedFetcher::with_app_shell();
    fetcher.respond_cross_origin("/cdn/lib.json", 200, "{}");
    fetcher.respond("/flaky.json", 503, "busy");
    let (worker, _) = active_worker(fetcher.clone()).await;

    for _ in 0..2 {
        respond(&worker, Request::get(url("/cdn/lib.json"))).await;
        let busy = respond(&worker, Request::get(url("/flaky.json"))).await;
        assert_eq!(busy.status, 503);
    }

    assert_eq!(fetcher.calls("/cdn/lib.json"), 2);
    assert_eq!(fetcher.calls("/flaky.json"), 2);
    assert_eq!(worker.caches().entry_count("dynamic-v2").await, Some(0));
}

#[tokio::test]
async fn test_cache_first_failure_without_fallback_is_network_error() {
    let (worker, _) = active_worker(ScriptedFetcher::with_app_shell()).await;

    let response = respond(&worker, Request::get(url("/data.json"))).await;
    assert!(response.is_network_error());
}

#[tokio::test]
async fn test_cache_first_failure_serves_fallback_asset() {
    let fetcher = ScriptedFetcher::with_app_shell();
    let with_fallback = WorkerConfig {
        fallback_asset: Some("/offline.html".into()),
        ..config()
    };
    let (worker, _) = build(with_fallback, fetcher);
    worker.start().await.unwrap();

    let response = respond(&worker, Request::get(url("/data.json"))).await;
    assert_eq!(response.text().unwrap(), "<html>offline</html>");
}

#[tokio::test]
async fn test_non_get_requests_are_not_cached() {
    let fetcher = ScriptedFetcher::with_app_shell();
    fetcher.respond("/api/echo", 200, "echo");
    let (worker, _) = active_worker(fetcher.clone()).await;

    for _ in 0..2 {
        let post = Request::get(url("/api/echo")).method(http::Method::POST);
        respond(&worker, post).await;
    }
    assert_eq!(fetcher.calls("/api/echo"), 2);
}
