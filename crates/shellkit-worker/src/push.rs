//! Push delivery: payload normalization, the notification registry, and
//! click-target resolution.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use url::{Position, Url};

use crate::clients::Client;
use crate::config::WorkerConfig;
use crate::{Result, ServiceWorkerError};

/// Browser-issued push subscription, as forwarded by the page to the backend.
///
/// The worker never stores these; the type exists so hosts can hand them
/// around without re-declaring the shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Inbound push payload. Every field is optional.
///
/// Scalar fields accept any JSON scalar and are stringified; values of the
/// wrong shape are ignored so a sloppy sender still gets a notification.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PushPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub action_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "object_only")]
    pub metadata: Option<Map<String, Value>>,
}

impl PushPayload {
    /// Parse the JSON body of a push message.
    pub fn parse(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| ServiceWorkerError::PushError(format!("invalid push payload: {e}")))
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

fn object_only<'de, D>(deserializer: D) -> std::result::Result<Option<Map<String, Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(Some(map)),
        _ => Ok(None),
    }
}

/// Data attached to a notification: the target URL plus any metadata the
/// sender included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: Option<String>,
    pub icon: Option<String>,
    pub data: NotificationData,
}

/// Identifier of a displayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub u64);

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification-{}", self.0)
    }
}

/// A displayed notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub options: NotificationOptions,
}

/// Turn a push payload into a title and display options.
///
/// `message` wins over `body`, `action_url` over `url`, and the target
/// defaults to `/`. Metadata keys are merged into `data`; `url` stays
/// authoritative.
pub fn normalize(payload: PushPayload, config: &WorkerConfig) -> (String, NotificationOptions) {
    let url = payload
        .action_url
        .or(payload.url)
        .unwrap_or_else(|| "/".to_string());

    let mut extra = payload.metadata.unwrap_or_default();
    extra.remove("url");

    let title = payload
        .title
        .unwrap_or_else(|| config.default_notification_title.clone());

    let options = NotificationOptions {
        body: payload.message.or(payload.body),
        icon: payload
            .icon
            .or_else(|| config.default_notification_icon.clone()),
        data: NotificationData { url, extra },
    };
    (title, options)
}

/// Notifications currently on screen.
#[derive(Debug, Default)]
pub struct Notifications {
    shown: Vec<Notification>,
    next_id: u64,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, title: String, options: NotificationOptions) -> Notification {
        self.next_id += 1;
        let notification = Notification {
            id: NotificationId(self.next_id),
            title,
            options,
        };
        self.shown.push(notification.clone());
        notification
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.shown.iter().find(|n| n.id == id)
    }

    /// Close a notification, handing it back.
    pub fn close(&mut self, id: NotificationId) -> Option<Notification> {
        let index = self.shown.iter().position(|n| n.id == id)?;
        Some(self.shown.remove(index))
    }

    pub fn list(&self) -> &[Notification] {
        &self.shown
    }
}

// ==================== Click resolution ====================

/// What a notification click did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickResolution {
    /// An open window was focused and told to navigate to `url`, given
    /// relative to the origin.
    Focused { client_id: String, url: String },
    /// No suitable window was open; a new one was opened at `url`.
    Opened { client_id: String, url: Url },
}

/// Whether a client at `client_path` should receive a click targeting `target_path`.
///
/// `/community` also matches any page under a community route.
pub fn matches_target(client_path: &str, target_path: &str) -> bool {
    client_path == target_path || (target_path == "/community" && client_path.contains("community"))
}

/// Path, query and fragment of `target`, as posted in a NAVIGATE message.
pub fn relative_target(target: &Url) -> &str {
    &target[Position::BeforePath..]
}

/// First window whose path matches the target.
pub fn find_target_client<'a>(windows: &'a [Client], target_path: &str) -> Option<&'a Client> {
    windows
        .iter()
        .find(|client| matches_target(client.path(), target_path))
}
