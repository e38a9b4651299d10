//! Clients API: the page contexts a worker can see, focus, message, and open.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::push::NotificationData;
use crate::{Result, ServiceWorkerError};

/// A client (open page or worker context).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Visibility state.
    pub visibility_state: VisibilityState,

    /// Whether focused.
    pub focused: bool,

    /// Whether the active worker controls this client.
    pub controlled: bool,
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    SharedWorker,
    All,
}

/// Visibility state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityState {
    Hidden,
    Visible,
}

impl Client {
    /// A visible, unfocused, uncontrolled window at `url`.
    pub fn window(url: Url) -> Self {
        Self {
            id: next_client_id(),
            url,
            client_type: ClientType::Window,
            visibility_state: VisibilityState::Visible,
            focused: false,
            controlled: false,
        }
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn is_window(&self) -> bool {
        self.client_type == ClientType::Window
    }
}

/// Options for [`Clients::match_all`].
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

/// Message posted from the worker to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Route the already-loaded app to `url` without a reload.
    Navigate {
        url: String,
        metadata: NotificationData,
    },
}

/// Known clients, in the order they appeared.
#[derive(Debug, Default)]
pub struct Clients {
    clients: Vec<Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.push(client);
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        let index = self.clients.iter().position(|c| c.id == id)?;
        Some(self.clients.remove(index))
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Match all clients.
    pub fn match_all(&self, options: &ClientMatchOptions) -> Vec<Client> {
        self.clients
            .iter()
            .filter(|c| options.include_uncontrolled || c.controlled)
            .filter(|c| match options.client_type {
                ClientType::All => true,
                t => c.client_type == t,
            })
            .cloned()
            .collect()
    }

    /// Focus a window client; every other client loses focus.
    pub fn focus(&mut self, id: &str) -> Result<Client> {
        let target = self
            .clients
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| ServiceWorkerError::ClientError(format!("no client {id}")))?;
        if !target.is_window() {
            return Err(ServiceWorkerError::ClientError(
                "Can only focus window clients".to_string(),
            ));
        }

        let mut focused = None;
        for client in &mut self.clients {
            client.focused = client.id == id;
            if client.focused {
                client.visibility_state = VisibilityState::Visible;
                focused = Some(client.clone());
            }
        }
        focused.ok_or_else(|| ServiceWorkerError::ClientError(format!("no client {id}")))
    }

    /// Open a window.
    pub fn open_window(&mut self, url: Url) -> Client {
        let mut client = Client::window(url);
        client.focused = true;
        client.controlled = true;

        for other in &mut self.clients {
            other.focused = false;
        }
        debug!(client_id = %client.id, url = %client.url, "Opened window");
        self.clients.push(client.clone());
        client
    }

    /// Claim all window clients. Returns how many were newly claimed.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.iter_mut().filter(|c| c.is_window()) {
            if !client.controlled {
                client.controlled = true;
                claimed += 1;
            }
        }
        claimed
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
