//! # Skiff
//!
//! A long-poll chat-bot SDK built around a small, composable event dispatch
//! engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  events/get   ┌──────────┐  Event   ┌────────────┐      ┌───────────┐
//! │ Bot API  │──────────────▶│ PollLoop │─────────▶│ Dispatcher │─────▶│ Handler 0 │
//! │ (HTTP)   │◀──────────────│ (cursor, │          │ (guard,    │─────▶│ Handler 1 │
//! └──────────┘  call_api     │ backoff) │          │ stop flow) │─────▶│ ...       │
//!      ▲                     └──────────┘          └────────────┘      └───────────┘
//!      └──────────────────────────── replies through Context ───────────────┘
//! ```
//!
//! - **Transport**: fetches event batches and performs outbound API calls
//! - **PollLoop**: tracks the last event id, retries with backoff
//! - **Dispatcher**: offers each event to handlers in registration order
//! - **Handlers**: a filter or check plus an async action
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use skiff::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().load_validated()?;
//!     logging::init_from_config(&config.logging)?;
//!
//!     let bot = Bot::from_config(&config)?;
//!     bot.register(on_help().handler(|ctx| async move { ctx.reply("Send me anything").await }));
//!     bot.register(on_message().filter(!Filter::command()).handler(|ctx| async move {
//!         let text = ctx.event().text()?.to_owned();
//!         ctx.reply(&text).await
//!     }));
//!
//!     bot.run_until_signal().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default): TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `http-client` (default): the HTTP transport and `Bot::from_config`
//! - `json-log`: JSON log output

pub use skiff_core as core;
pub use skiff_framework as framework;
pub use skiff_runtime as runtime;
pub use skiff_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use skiff::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use skiff_runtime::config::{ConfigLoader, SkiffConfig, load_config};
    pub use skiff_runtime::{Bot, PollSettings, RuntimeError, logging};

    // Handlers and dispatch
    pub use skiff_framework::{
        Context, Dispatcher, Feedback, Filter, Handler, HandlerError, HandlerResult, Outcome,
        Role, Verdict, feedback_command, on_callback_query, on_changed_chat_info, on_command,
        on_default, on_deleted_message, on_edited_message, on_help, on_left_chat_members,
        on_message, on_new_chat_members, on_pinned_message, on_start, on_unknown_command,
        on_unpinned_message,
    };

    // Events and transport
    pub use skiff_core::{
        BoxedTransport, ChatType, Event, EventType, Transport, TransportError,
    };

    #[cfg(feature = "http-client")]
    pub use skiff_transport::{HttpConfig, HttpTransport};
}
