//! Timeout and cancellation utilities.
//!
//! Both helpers drop the losing future, so the work behind it is torn
//! down instead of left running in the background.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::SwKitError;

/// Run an operation with a timeout.
pub async fn with_timeout<T, F, Fut>(timeout: Duration, operation: F) -> crate::Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    tokio::time::timeout(timeout, operation())
        .await
        .map_err(|_| {
            trace!(?timeout, "Operation timed out");
            SwKitError::Timeout(timeout)
        })
}

/// Run a future until it completes or the token is cancelled.
pub async fn run_cancellable<T, Fut>(token: &CancellationToken, fut: Fut) -> crate::Result<T>
where
    Fut: Future<Output = T>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(SwKitError::Cancelled),
        value = fut => Ok(value),
    }
}
