//! Shared fixtures for worker integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use shellkit_common::{init_logging, LogConfig};
use shellkit_net::{Fetcher, NetError, Request, Response, ResponseType};
use shellkit_worker::{ServiceWorker, ServiceWorkerEvent, WorkerConfig};
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

pub const ORIGIN: &str = "https://app.example.com/";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn config() -> WorkerConfig {
    WorkerConfig::for_scope(Url::parse(ORIGIN).unwrap())
}

/// Install debug logging once per test binary; later calls are no-ops.
pub fn init_tracing() {
    let _ = init_logging(LogConfig::debug().with_filter("shellkit_worker=debug"));
}

#[derive(Debug, Clone)]
enum Reply {
    Respond {
        status: u16,
        body: Bytes,
        response_type: ResponseType,
    },
    Fail,
}

#[derive(Debug, Clone)]
struct Script {
    reply: Reply,
    delay: Option<Duration>,
}

/// In-memory fetcher answering from a per-URL script.
///
/// Unscripted URLs fail as if the network were down. `calls` counts every
/// fetch started; `completed` only counts fetches that ran to the end, so
/// a fetch whose future was dropped shows up in the first but not the second.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
    completed: Mutex<HashMap<String, usize>>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fetcher that serves the default precache manifest.
    pub fn with_app_shell() -> Arc<Self> {
        let fetcher = Self::new();
        fetcher.respond("/", 200, "<html>root</html>");
        fetcher.respond("/index.html", 200, "<html>app shell</html>");
        fetcher.respond("/manifest.json", 200, r#"{"name":"SpeakLife"}"#);
        fetcher.respond("/offline.html", 200, "<html>offline</html>");
        fetcher
    }

    pub fn respond(&self, path: &str, status: u16, body: &'static str) {
        self.script(path, status, body, ResponseType::Basic);
    }

    pub fn respond_cross_origin(&self, path: &str, status: u16, body: &'static str) {
        self.script(path, status, body, ResponseType::Cors);
    }

    pub fn fail(&self, path: &str) {
        self.scripts.lock().unwrap().insert(
            url(path).to_string(),
            Script {
                reply: Reply::Fail,
                delay: None,
            },
        );
    }

    /// Delay the scripted reply for `path`.
    pub fn delay(&self, path: &str, delay: Duration) {
        if let Some(script) = self.scripts.lock().unwrap().get_mut(url(path).as_str()) {
            script.delay = Some(delay);
        }
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls_for(&url(path))
    }

    pub fn calls_for(&self, url: &Url) -> usize {
        *self.calls.lock().unwrap().get(url.as_str()).unwrap_or(&0)
    }

    pub fn completed(&self, path: &str) -> usize {
        *self.completed.lock().unwrap().get(url(path).as_str()).unwrap_or(&0)
    }

    fn script(&self, path: &str, status: u16, body: &'static str, response_type: ResponseType) {
        self.scripts.lock().unwrap().insert(
            url(path).to_string(),
            Script {
                reply: Reply::Respond {
                    status,
                    body: Bytes::from_static(body.as_bytes()),
                    response_type,
                },
                delay: None,
            },
        );
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let key = request.url.to_string();
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;
        let script = self.scripts.lock().unwrap().get(&key).cloned();

        let Some(script) = script else {
            return Err(NetError::RequestFailed(format!("no route to {key}")));
        };
        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }
        *self.completed.lock().unwrap().entry(key).or_default() += 1;

        match script.reply {
            Reply::Respond {
                status,
                body,
                response_type,
            } => Ok(Response::new(request.url.clone(), status, response_type, body)),
            Reply::Fail => Err(NetError::RequestFailed("connection reset".into())),
        }
    }
}

pub fn build(
    config: WorkerConfig,
    fetcher: Arc<ScriptedFetcher>,
) -> (ServiceWorker, UnboundedReceiver<ServiceWorkerEvent>) {
    ServiceWorker::builder(config, fetcher).build().unwrap()
}

/// A worker that has been installed and activated against the app shell.
pub async fn active_worker(
    fetcher: Arc<ScriptedFetcher>,
) -> (ServiceWorker, UnboundedReceiver<ServiceWorkerEvent>) {
    let (worker, events) = build(config(), fetcher);
    worker.start().await.unwrap();
    (worker, events)
}

pub fn drain(events: &mut UnboundedReceiver<ServiceWorkerEvent>) -> Vec<ServiceWorkerEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
