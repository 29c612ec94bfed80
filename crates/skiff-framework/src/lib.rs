//! # Skiff Framework
//!
//! The event dispatch engine of the Skiff bot SDK.
//!
//! This layer provides:
//! - A composable [`Filter`] algebra over events
//! - [`Handler`]s pairing a check with an async action
//! - The [`Dispatcher`] with stop semantics, default and unknown-command
//!   handlers, and per-handler failure isolation
//! - [`EventCache`] for suppressing re-delivered messages
//! - Convenience constructors (`on_message`, `on_command`, `on_default`, ...)
//!
//! Polling and bot lifecycle are in `skiff-runtime`.

pub mod builders;
pub mod cache;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod handler;

#[cfg(test)]
pub(crate) mod testing;

pub use builders::{
    Feedback, feedback_command, on_callback_query, on_changed_chat_info, on_command,
    on_default, on_deleted_message, on_edited_message, on_help, on_left_chat_members,
    on_message, on_new_chat_members, on_pinned_message, on_start, on_unknown_command,
    on_unpinned_message, skip_duplicates,
};
pub use cache::{CacheConfig, EventCache};
pub use dispatcher::{DispatchSummary, Dispatcher};
pub use error::{HandlerError, HandlerResult};
pub use filter::{AttachmentKind, Filter, Leaf, command_name, is_command_text};
pub use handler::{
    Action, CheckFn, Context, Handler, HandlerId, IntoOutcome, Outcome, Role, Verdict,
};
