//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use skiff_framework::CacheConfig as EventCacheConfig;

use crate::poll::{PollSettings, RetryPolicy};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SkiffConfig {
    /// Bot identity and API endpoint.
    #[serde(default)]
    pub bot: BotConfig,

    /// Long-poll timing and retry settings.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Duplicate-delivery cache.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Bot
// =============================================================================

/// Bot identity and API endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot token issued by the platform.
    #[serde(default)]
    pub token: String,

    /// Base URL of the bot API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Application name reported in the User-Agent.
    #[serde(default)]
    pub name: Option<String>,

    /// Application version reported in the User-Agent.
    #[serde(default)]
    pub version: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: default_api_url(),
            name: None,
            version: None,
        }
    }
}

fn default_api_url() -> String {
    "https://api.icq.net/bot/v1".to_string()
}

// =============================================================================
// Polling
// =============================================================================

/// Long-poll timing and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// How long the server may hold a poll request, in seconds.
    #[serde(default = "default_poll_time_secs")]
    pub poll_time_secs: u64,

    /// Extra time allowed on top of the poll time, and the timeout of
    /// other API calls, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Backoff after failed polls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Minimum wait after the server rejected the token, in milliseconds.
    #[serde(default = "default_credential_delay_ms")]
    pub credential_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_time_secs: default_poll_time_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
            credential_delay_ms: default_credential_delay_ms(),
        }
    }
}

impl PollingConfig {
    /// Converts to the settings the poll loop runs with.
    pub fn to_settings(&self) -> PollSettings {
        PollSettings {
            poll_time: Duration::from_secs(self.poll_time_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            retry: self.retry.to_policy(),
            credential_delay: Duration::from_millis(self.credential_delay_ms),
        }
    }
}

fn default_poll_time_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_credential_delay_ms() -> u64 {
    5000
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.backoff_multiplier,
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// =============================================================================
// Cache
// =============================================================================

/// Duplicate-delivery cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether re-delivered messages are suppressed at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of message ids remembered.
    #[serde(default = "default_cache_capacity")]
    pub capacity: u64,

    /// Entry lifetime in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn to_cache_config(&self) -> EventCacheConfig {
        EventCacheConfig {
            capacity: self.capacity,
            ttl: Duration::from_secs(self.ttl_secs),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> u64 {
    1024
}

fn default_cache_ttl_secs() -> u64 {
    60
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// When log files are rotated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// How much of the per-event `dispatch` span is reported.
///
/// Lines logged while an event is dispatched always carry its `event_id`
/// and `event_type` once the span is enabled; this only controls the span's
/// own lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchSpans {
    /// No span lines.
    #[default]
    Off,
    /// One line per event when dispatch ends, with its duration.
    Close,
    /// A line when dispatch starts and one when it ends.
    Full,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of each log statement.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `skiff_transport = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            filters: HashMap::new(),
        }
    }
}
