//! # Skiff Core
//!
//! Foundation types of the Skiff bot SDK:
//!
//! - **Event model**: typed, immutable events decoded from the long-poll
//!   payloads ([`Event`], [`EventType`], [`RawEvent`])
//! - **Errors**: [`TransportError`] and [`EventError`]
//! - **Transport contract**: the narrow [`Transport`] trait the dispatch
//!   engine talks to
//!
//! The dispatch engine itself lives in `skiff-framework`; the poll loop and
//! bot lifecycle live in `skiff-runtime`.

pub mod error;
pub mod event;
pub mod transport;

pub use error::{EventError, EventResult, TransportError, TransportResult};
pub use event::{ChatType, Event, EventBatch, EventType, Part, PartKind, RawEvent};
pub use transport::{BoxedTransport, Params, Transport};
