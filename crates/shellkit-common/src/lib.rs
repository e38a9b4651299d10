//! # Shellkit Common
//!
//! Common utilities, error types, and logging configuration for the offline shell worker.
//!
//! ## Features
//!
//! - Unified error type
//! - Logging configuration and setup
//! - Timeout and cancellation utilities
//! - Result extension traits

use std::time::Duration;
use thiserror::Error;

pub mod logging;
pub mod timeout;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use timeout::{run_cancellable, with_timeout};

/// Unified error type for the worker stack.
#[derive(Error, Debug)]
pub enum SwKitError {
    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Timeout errors.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Cancelled operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl SwKitError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            SwKitError::Config { .. } => "config",
            SwKitError::Timeout(_) => "timeout",
            SwKitError::Cancelled => "cancelled",
            SwKitError::NotFound(_) => "not_found",
            SwKitError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

/// Result type alias for shared operations.
pub type Result<T> = std::result::Result<T, SwKitError>;

/// Extension trait for Option.
pub trait OptionExt<T> {
    /// Convert None to a NotFound error.
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| SwKitError::NotFound(resource.into()))
    }
}
