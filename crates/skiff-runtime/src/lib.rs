//! Skiff Runtime - polling, configuration and lifecycle for Skiff bots.
//!
//! This crate provides:
//! - The long-poll loop with cursor tracking and backoff ([`PollLoop`])
//! - The [`Bot`] embedding surface: handler registration, start/stop,
//!   running until a shutdown signal
//! - Layered configuration with figment ([`ConfigLoader`])
//! - Logging setup ([`LoggingBuilder`])
//!
//! ```ignore
//! use skiff_runtime::{Bot, config::load_config, logging};
//! use skiff_framework::on_help;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     logging::init_from_config(&config.logging)?;
//!
//!     let bot = Bot::from_config(&config)?;
//!     bot.register(on_help().handler(|ctx| async move { ctx.reply("Hi!").await }));
//!     bot.run_until_signal().await?;
//!     Ok(())
//! }
//! ```
//!
//! `Bot::from_config` requires the `http-client` feature.

pub mod bot;
pub mod config;
pub mod error;
pub mod logging;
pub mod poll;

// Re-exports
pub use bot::{Bot, BotBuilder, BotStatus};
pub use config::{ConfigError, ConfigLoader, ConfigResult, SkiffConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use poll::{
    Backoff, MIN_RETRY_DELAY, PollCursor, PollLoop, PollSettings, RetryPolicy, SharedDispatcher,
};

// Re-export tracing for use by bot code
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
