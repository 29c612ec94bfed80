//! Error types for the Skiff framework.

use skiff_core::{EventError, TransportError};
use thiserror::Error;

/// A failure inside a handler's check or action.
///
/// The dispatcher logs these and moves on to the next handler. Stopping
/// dispatch is not an error; see [`Verdict::Stop`](crate::Verdict::Stop) and
/// [`Outcome::Stop`](crate::Outcome::Stop).
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// Handler-specific failure.
    #[error("{0}")]
    Failed(String),

    /// A required event field was missing.
    #[error(transparent)]
    Event(#[from] EventError),

    /// An outbound API call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The check or action panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Creates a handler-specific failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(msg)
    }
}

impl From<String> for HandlerError {
    fn from(msg: String) -> Self {
        Self::Failed(msg)
    }
}

impl From<&str> for HandlerError {
    fn from(msg: &str) -> Self {
        Self::Failed(msg.to_string())
    }
}

/// Result type for handler checks and actions.
pub type HandlerResult<T> = Result<T, HandlerError>;
