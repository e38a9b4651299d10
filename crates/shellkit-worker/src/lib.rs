//! # Shellkit Worker
//!
//! Offline caching, request routing, and push delivery for the SpeakLife web app.
//!
//! ## Features
//!
//! - **Lifecycle**: install (precache the app shell), activate (evict stale generations, claim clients)
//! - **Routing**: backend bypass, navigations, sub-resources, everything else
//! - **Strategies**: network-first with timeout, stale-while-revalidate, cache-first
//! - **Push**: payload normalization, notification clicks routed into open windows
//! - **Background sync**: tag-triggered replay hook
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorker (one per generation, built once at startup)
//!     ├── Lifecycle      NEW → INSTALLING → INSTALLED → ACTIVATING → ACTIVE
//!     ├── Router         Request → Route
//!     ├── strategy       Route + Request → FetchDisposition
//!     │       └── CacheStore
//!     │               ├── static-<version>   (app shell)
//!     │               └── dynamic-<version>  (runtime)
//!     ├── Notifications  push payload → Notification
//!     ├── Clients        notification click → focus + NAVIGATE | open window
//!     └── BackgroundSync sync tag → SyncReplayer
//!
//! CacheStorage (origin-wide, outlives worker generations)
//!     └── Cache
//!             └── (method, URL) → CacheEntry
//! ```

use shellkit_common::SwKitError;
use shellkit_net::NetError;
use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod config;
pub mod events;
pub mod lifecycle;
pub mod push;
pub mod router;
pub mod strategy;
pub mod sync;
pub mod worker;

pub use cache::{Cache, CacheEntry, CacheStorage, CacheStore, SharedCacheStorage};
pub use clients::{Client, ClientMatchOptions, ClientMessage, ClientType, Clients};
pub use config::{InstallPolicy, WorkerConfig};
pub use events::{EventOutcome, PushMessage, ServiceWorkerEvent, WorkerEvent};
pub use lifecycle::{EvictionReport, Lifecycle, PrecacheReport, WorkerState};
pub use push::{
    ClickResolution, Notification, NotificationData, NotificationId, NotificationOptions,
    Notifications, PushPayload, PushSubscription,
};
pub use router::{Route, Router};
pub use strategy::{FetchDisposition, StrategyContext};
pub use sync::{BackgroundSync, NoopReplayer, SyncOutcome, SyncReplayer};
pub use worker::{ServiceWorker, ServiceWorkerBuilder, ServiceWorkerId};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Push error: {0}")]
    PushError(String),

    #[error("Client error: {0}")]
    ClientError(String),

    #[error("Sync error: {0}")]
    SyncError(String),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Common(#[from] SwKitError),
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;
