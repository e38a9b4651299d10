//! Background sync hook.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::Result;

/// Replays writes that were queued while offline.
///
/// Implementations must replay every queued write in its original order
/// and clear the queue once all of them went through.
#[async_trait]
pub trait SyncReplayer: Send + Sync {
    /// Returns how many writes were replayed.
    async fn replay(&self) -> Result<usize>;
}

/// Replayer with an always-empty queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReplayer;

#[async_trait]
impl SyncReplayer for NoopReplayer {
    async fn replay(&self) -> Result<usize> {
        Ok(0)
    }
}

/// Outcome of a sync event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Replayed(usize),
    /// The tag is not ours.
    Ignored,
}

/// Routes sync events carrying the configured tag to the replayer.
#[derive(Clone)]
pub struct BackgroundSync {
    tag: String,
    replayer: Arc<dyn SyncReplayer>,
}

impl BackgroundSync {
    pub fn new(tag: impl Into<String>, replayer: Arc<dyn SyncReplayer>) -> Self {
        Self {
            tag: tag.into(),
            replayer,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub async fn handle(&self, tag: &str) -> Result<SyncOutcome> {
        if tag != self.tag {
            debug!(tag, "Ignoring sync event");
            return Ok(SyncOutcome::Ignored);
        }

        let replayed = self.replayer.replay().await?;
        info!(tag, replayed, "Background sync complete");
        Ok(SyncOutcome::Replayed(replayed))
    }
}
