//! Error types for the remote event bus.

use std::fmt;

use thiserror::Error;

/// Errors surfaced by the bus, its adapters, and the connection pool.
#[derive(Debug, Error)]
pub enum BusError {
    /// Invalid or missing settings, detected at construction time.
    /// This is the only fatal error class — everything else is survivable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A broker connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The broker rejected or failed to place a published envelope.
    #[error("publish failed: {0}")]
    Publish(String),

    /// Consuming from a channel failed; the consumer loop logs this and keeps polling.
    #[error("consume failed: {0}")]
    Consume(String),

    /// A position commit failed; the consumer loop logs this and keeps polling.
    #[error("commit failed: {0}")]
    Commit(String),

    /// Encoding a payload or decoding an envelope failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The pool or subscriber is shutting down and cannot serve the request.
    #[error("shutting down")]
    ShuttingDown,
}

impl BusError {
    /// Blank-or-missing settings check used by every adapter constructor.
    pub(crate) fn require_setting(value: &str, name: &str) -> Result<(), BusError> {
        if value.trim().is_empty() {
            Err(BusError::Configuration(format!("{name} must not be blank")))
        } else {
            Ok(())
        }
    }
}

/// Failure raised by a registered event handler.
///
/// Handler failures are isolated per handler: they are logged, reported on
/// the engine's side channel, and never propagate out of dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler error: {}", self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
