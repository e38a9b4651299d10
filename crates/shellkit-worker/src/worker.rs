//! The worker context: one object per generation, owning every piece of
//! state the event handlers touch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use shellkit_common::OptionExt;
use shellkit_net::{Fetcher, Request};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::cache::{CacheStorage, CacheStore, SharedCacheStorage};
use crate::clients::{ClientMatchOptions, ClientMessage, ClientType, Clients};
use crate::config::WorkerConfig;
use crate::events::{EventOutcome, ServiceWorkerEvent, WorkerEvent};
use crate::lifecycle::{self, EvictionReport, Lifecycle, PrecacheReport, WorkerState};
use crate::push::{self, ClickResolution, Notification, NotificationId, Notifications, PushPayload};
use crate::router::Router;
use crate::strategy::{self, FetchDisposition, StrategyContext};
use crate::sync::{BackgroundSync, NoopReplayer, SyncOutcome, SyncReplayer};
use crate::{Result, ServiceWorkerError};

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ServiceWorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sw-{}", self.0)
    }
}

/// Builder for [`ServiceWorker`].
pub struct ServiceWorkerBuilder {
    config: WorkerConfig,
    fetcher: Arc<dyn Fetcher>,
    storage: Option<SharedCacheStorage>,
    clients: Option<Arc<RwLock<Clients>>>,
    replayer: Arc<dyn SyncReplayer>,
}

impl ServiceWorkerBuilder {
    pub fn new(config: WorkerConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            fetcher,
            storage: None,
            clients: None,
            replayer: Arc::new(NoopReplayer),
        }
    }

    /// Share cache storage with other worker generations.
    pub fn storage(mut self, storage: SharedCacheStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Share the client list with the host.
    pub fn clients(mut self, clients: Arc<RwLock<Clients>>) -> Self {
        self.clients = Some(clients);
        self
    }

    pub fn sync_replayer(mut self, replayer: Arc<dyn SyncReplayer>) -> Self {
        self.replayer = replayer;
        self
    }

    /// Validate the configuration and build the worker.
    pub fn build(self) -> Result<(ServiceWorker, mpsc::UnboundedReceiver<ServiceWorkerEvent>)> {
        self.config.validate()?;

        let config = Arc::new(self.config);
        let storage = self.storage.unwrap_or_else(CacheStorage::shared);
        let store = CacheStore::new(
            storage,
            config.static_cache_name(),
            config.dynamic_cache_name(),
        );
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let worker = ServiceWorker {
            id: ServiceWorkerId::new(),
            router: Router::new(config.backend_host.clone()),
            sync: BackgroundSync::new(config.sync_tag.clone(), self.replayer),
            ctx: StrategyContext {
                store,
                fetcher: self.fetcher,
                config: config.clone(),
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            },
            config,
            lifecycle: RwLock::new(Lifecycle::new()),
            clients: self.clients.unwrap_or_default(),
            notifications: RwLock::new(Notifications::new()),
            event_tx,
        };

        debug!(
            worker_id = %worker.id,
            static_cache = worker.ctx.store.static_name(),
            dynamic_cache = worker.ctx.store.dynamic_name(),
            "Service worker built"
        );
        Ok((worker, event_rx))
    }
}

/// A service worker generation.
pub struct ServiceWorker {
    id: ServiceWorkerId,
    config: Arc<WorkerConfig>,
    ctx: StrategyContext,
    router: Router,
    lifecycle: RwLock<Lifecycle>,
    clients: Arc<RwLock<Clients>>,
    notifications: RwLock<Notifications>,
    sync: BackgroundSync,
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl ServiceWorker {
    pub fn builder(config: WorkerConfig, fetcher: Arc<dyn Fetcher>) -> ServiceWorkerBuilder {
        ServiceWorkerBuilder::new(config, fetcher)
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub async fn state(&self) -> WorkerState {
        self.lifecycle.read().await.state()
    }

    pub fn caches(&self) -> &CacheStore {
        &self.ctx.store
    }

    pub fn clients(&self) -> &Arc<RwLock<Clients>> {
        &self.clients
    }

    /// Notifications currently displayed.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().await.list().to_vec()
    }

    // ==================== Lifecycle ====================

    /// Precache the static manifest and become the activation candidate.
    pub async fn install(&self) -> Result<PrecacheReport> {
        self.set_state(WorkerState::Installing).await?;

        let fetcher = self.ctx.fetcher.as_ref();
        let report = match lifecycle::precache(&self.ctx.store, fetcher, &self.config).await {
            Ok(report) => report,
            Err(e) => {
                warn!(worker_id = %self.id, error = %e, "Install failed");
                self.set_state(WorkerState::Redundant).await?;
                return Err(e);
            }
        };

        self.lifecycle.write().await.skip_waiting();
        self.set_state(WorkerState::Installed).await?;
        Ok(report)
    }

    /// Evict stale cache generations and take control of open windows.
    pub async fn activate(&self) -> Result<EvictionReport> {
        self.set_state(WorkerState::Activating).await?;

        let report = lifecycle::evict_stale(&self.ctx.store).await;
        let claimed = self.clients.write().await.claim();
        info!(
            worker_id = %self.id,
            deleted = report.deleted.len(),
            claimed,
            "Activation complete"
        );

        self.set_state(WorkerState::Active).await?;
        Ok(report)
    }

    /// Install, then activate straight away when waiting was skipped.
    pub async fn start(&self) -> Result<WorkerState> {
        self.install().await?;
        let skip_waiting = self.lifecycle.read().await.is_waiting_skipped();
        if skip_waiting {
            self.activate().await?;
        }
        Ok(self.state().await)
    }

    async fn set_state(&self, next: WorkerState) -> Result<()> {
        let previous = self.lifecycle.write().await.transition(next)?;
        info!(worker_id = %self.id, from = ?previous, state = ?next, "State changed");
        self.emit(ServiceWorkerEvent::StateChange {
            worker_id: self.id,
            state: next,
        });
        Ok(())
    }

    // ==================== Fetch ====================

    /// Route an intercepted request to its strategy.
    pub async fn handle_fetch(&self, request: Request) -> FetchDisposition {
        if !self.lifecycle.read().await.is_active() {
            trace!(url = %request.url, "Worker not active, passing through");
            return FetchDisposition::Passthrough;
        }

        let route = self.router.classify(&request);
        strategy::execute(&self.ctx, route, request).await
    }

    // ==================== Push ====================

    /// Show a notification for a push message.
    pub async fn handle_push(&self, data: Option<&[u8]>) -> Result<Notification> {
        let result = self.show_push(data).await;
        if let Err(e) = &result {
            warn!(worker_id = %self.id, error = %e, "Push not delivered");
        }
        result
    }

    async fn show_push(&self, data: Option<&[u8]>) -> Result<Notification> {
        let data =
            data.ok_or_else(|| ServiceWorkerError::PushError("push message has no payload".into()))?;
        let payload = PushPayload::parse(data)?;
        let (title, options) = push::normalize(payload, &self.config);

        let notification = self.notifications.write().await.show(title, options);
        info!(id = %notification.id, title = %notification.title, "Showing notification");
        self.emit(ServiceWorkerEvent::NotificationShown {
            id: notification.id,
            title: notification.title.clone(),
        });
        Ok(notification)
    }

    /// Close the notification and route the user to its target.
    pub async fn handle_notification_click(&self, id: NotificationId) -> Result<ClickResolution> {
        let notification = self
            .notifications
            .write()
            .await
            .close(id)
            .ok_or_not_found(id.to_string())?;
        self.emit(ServiceWorkerEvent::NotificationClosed { id });

        let data = notification.options.data;
        let target = self.config.resolve(&data.url)?;
        let target_path = target.path();
        let navigate_to = push::relative_target(&target).to_string();

        let mut clients = self.clients.write().await;
        let windows = clients.match_all(&ClientMatchOptions {
            include_uncontrolled: true,
            client_type: ClientType::Window,
        });

        if let Some(client) = push::find_target_client(&windows, target_path) {
            let client = clients.focus(&client.id)?;
            debug!(client_id = %client.id, url = %navigate_to, "Focusing existing window");
            self.emit(ServiceWorkerEvent::ClientFocused {
                client_id: client.id.clone(),
            });
            self.emit(ServiceWorkerEvent::ClientMessage {
                client_id: client.id.clone(),
                message: ClientMessage::Navigate {
                    url: navigate_to.clone(),
                    metadata: data,
                },
            });
            return Ok(ClickResolution::Focused {
                client_id: client.id,
                url: navigate_to,
            });
        }

        let client = clients.open_window(target.clone());
        self.emit(ServiceWorkerEvent::WindowOpened {
            client_id: client.id.clone(),
            url: target.clone(),
        });
        Ok(ClickResolution::Opened {
            client_id: client.id,
            url: target,
        })
    }

    // ==================== Sync ====================

    pub async fn handle_sync(&self, tag: &str) -> Result<SyncOutcome> {
        self.sync.handle(tag).await
    }

    /// Handle any host event.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::Install => self.install().await.map(EventOutcome::Installed),
            WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => Ok(EventOutcome::Fetch(self.handle_fetch(request).await)),
            WorkerEvent::Push(message) => self
                .handle_push(message.data.as_deref())
                .await
                .map(EventOutcome::NotificationShown),
            WorkerEvent::NotificationClick(id) => self
                .handle_notification_click(id)
                .await
                .map(EventOutcome::ClickResolved),
            WorkerEvent::Sync(tag) => self.handle_sync(&tag).await.map(EventOutcome::Sync),
        }
    }

    // ==================== Background work ====================

    /// Wait for background revalidations spawned so far to finish.
    ///
    /// After [`shutdown`](Self::shutdown) the tracker stays closed.
    pub async fn settle(&self) {
        let tracker = &self.ctx.tracker;
        tracker.close();
        tracker.wait().await;
        if !self.ctx.shutdown.is_cancelled() {
            tracker.reopen();
        }
    }

    /// Cancel in-flight races and background work, then wait for it to stop.
    pub async fn shutdown(&self) {
        info!(worker_id = %self.id, "Shutting down");
        self.ctx.shutdown.cancel();
        self.ctx.tracker.close();
        self.ctx.tracker.wait().await;
    }

    fn emit(&self, event: ServiceWorkerEvent) {
        let _ = self.event_tx.send(event);
    }
}
