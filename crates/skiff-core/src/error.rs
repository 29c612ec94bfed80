//! Unified error types for the Skiff core.
//!
//! Handler-level errors live in `skiff-framework`; configuration and lifecycle
//! errors live in `skiff-runtime`.

use thiserror::Error;

use crate::event::EventType;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur while talking to the bot API.
///
/// Every variant is retryable from the point of view of the poll loop.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The server rejected the bot token.
    #[error("invalid credential: {reason}")]
    InvalidCredential {
        /// Reason reported by the server.
        reason: String,
    },

    /// The request could not be sent or the connection dropped.
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete in time.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The server answered with an application-level error.
    #[error("API error (status {status}): {description}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Description reported by the server.
        description: String,
    },
}

impl TransportError {
    /// Creates an invalid-credential error.
    pub fn invalid_credential(reason: impl Into<String>) -> Self {
        Self::InvalidCredential {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the server rejected the credentials.
    pub fn is_invalid_credential(&self) -> bool {
        matches!(self, Self::InvalidCredential { .. })
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

// =============================================================================
// Event Errors
// =============================================================================

/// Errors raised while decoding events or reading their derived fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The wire type is not one of the known event types.
    #[error("unknown event type '{0}'")]
    UnknownType(String),

    /// The payload is not a JSON object.
    #[error("invalid payload for event {event_id}: {reason}")]
    InvalidPayload {
        /// Server-assigned event id.
        event_id: i64,
        /// Reason for failure.
        reason: String,
    },

    /// A derived field was requested that this event does not carry.
    #[error("{event_type} event has no '{field}' field")]
    MissingField {
        /// The event's type.
        event_type: EventType,
        /// Name of the missing field.
        field: &'static str,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for event decoding and field access.
pub type EventResult<T> = Result<T, EventError>;
