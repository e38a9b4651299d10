//! Inbound host events and the outbound events the worker emits.

use bytes::Bytes;
use shellkit_net::Request;
use url::Url;

use crate::clients::ClientMessage;
use crate::lifecycle::{EvictionReport, PrecacheReport, WorkerState};
use crate::push::{ClickResolution, Notification, NotificationId};
use crate::strategy::FetchDisposition;
use crate::sync::SyncOutcome;
use crate::worker::ServiceWorkerId;

/// Event delivered by the host to the worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Push(PushMessage),
    NotificationClick(NotificationId),
    Sync(String),
}

/// Push message data.
#[derive(Debug, Clone, Default)]
pub struct PushMessage {
    /// Raw payload, if any.
    pub data: Option<Bytes>,
}

impl PushMessage {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    /// A push with no payload.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// What handling a [`WorkerEvent`] produced.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed(PrecacheReport),
    Activated(EvictionReport),
    Fetch(FetchDisposition),
    NotificationShown(Notification),
    ClickResolved(ClickResolution),
    Sync(SyncOutcome),
}

/// Events emitted to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceWorkerEvent {
    /// State changed.
    StateChange {
        worker_id: ServiceWorkerId,
        state: WorkerState,
    },
    /// A notification should be displayed.
    NotificationShown { id: NotificationId, title: String },
    /// A notification was dismissed by a click.
    NotificationClosed { id: NotificationId },
    /// Post a message to a client.
    ClientMessage {
        client_id: String,
        message: ClientMessage,
    },
    /// A window client was brought to the foreground.
    ClientFocused { client_id: String },
    /// A new window was opened.
    WindowOpened { client_id: String, url: Url },
}
