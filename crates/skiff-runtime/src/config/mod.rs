//! Configuration for Skiff bots.
//!
//! Settings are layered with figment from built-in defaults, config files,
//! `SKIFF_*` environment variables and programmatic overrides, then checked
//! by [`validate_config`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config};
pub use schema::{
    BotConfig, CacheConfig, DispatchSpans, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, PollingConfig, RetryConfig, SkiffConfig,
};
pub use validation::validate_config;
