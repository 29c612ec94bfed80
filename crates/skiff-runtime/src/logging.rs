//! Logging setup for Skiff bots.
//!
//! The poll loop, dispatcher and transport all log through `tracing`. Each
//! event is dispatched inside a `dispatch` span (target
//! `skiff_framework::dispatcher`, level debug) with `event_id` and
//! `event_type` fields, so anything a handler logs can be traced back to the
//! event that triggered it. [`DispatchSpans`] turns those spans on.
//!
//! ```rust,ignore
//! use skiff_runtime::config::{DispatchSpans, load_config};
//! use skiff_runtime::logging::{self, LoggingBuilder};
//!
//! // From a loaded configuration
//! logging::init_from_config(&load_config()?.logging)?;
//!
//! // Or by hand
//! LoggingBuilder::new()
//!     .directive("skiff_transport=debug")
//!     .dispatch_spans(DispatchSpans::Close)
//!     .try_init()?;
//! ```
//!
//! `RUST_LOG`, when set, replaces the configured base level; per-target
//! directives are still applied on top of it.

use std::path::PathBuf;

use tracing::warn;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{DispatchSpans, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig};
use crate::error::{RuntimeError, RuntimeResult};

/// Target of the per-event dispatch span.
pub const DISPATCH_TARGET: &str = "skiff_framework::dispatcher";

impl DispatchSpans {
    fn fmt_span(self) -> FmtSpan {
        match self {
            Self::Off => FmtSpan::NONE,
            Self::Close => FmtSpan::CLOSE,
            Self::Full => FmtSpan::NEW | FmtSpan::CLOSE,
        }
    }
}

impl LogRotation {
    fn rotation(self) -> Rotation {
        match self {
            Self::Never => Rotation::NEVER,
            Self::Hourly => Rotation::HOURLY,
            Self::Daily => Rotation::DAILY,
        }
    }
}

/// Installs the global subscriber described by `config`.
///
/// Fails if a subscriber is already installed or the log file cannot be
/// opened.
pub fn init_from_config(config: &LoggingConfig) -> RuntimeResult<()> {
    LoggingBuilder::from_config(config).try_init()
}

/// Builds the global `tracing` subscriber.
#[derive(Debug, Clone, Default)]
pub struct LoggingBuilder {
    config: LoggingConfig,
    directives: Vec<String>,
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a [`LoggingConfig`]; its `filters` become directives in
    /// target order.
    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut filters: Vec<_> = config.filters.iter().collect();
        filters.sort_by(|a, b| a.0.cmp(b.0));

        Self {
            config: config.clone(),
            directives: filters
                .into_iter()
                .map(|(target, level)| format!("{target}={level}"))
                .collect(),
        }
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Adds a filter directive, e.g. `"skiff_transport=trace"`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn dispatch_spans(mut self, spans: DispatchSpans) -> Self {
        self.config.dispatch_spans = spans;
        self
    }

    pub fn stderr(mut self) -> Self {
        self.config.output = LogOutput::Stderr;
        self
    }

    /// Writes to `path`, rotated per `rotation`.
    pub fn file(mut self, path: impl Into<PathBuf>, rotation: LogRotation) -> Self {
        self.config.output = LogOutput::File;
        self.config.file_path = Some(path.into());
        self.config.rotation = rotation;
        self
    }

    /// Directives applied on top of the base level, including the one that
    /// enables dispatch spans when the base level would hide them.
    pub fn directives(&self) -> Vec<String> {
        let mut directives = self.directives.clone();
        let span_hidden = self.config.level.to_tracing_level() < tracing::Level::DEBUG;
        if self.config.dispatch_spans != DispatchSpans::Off && span_hidden {
            directives.push(format!("{DISPATCH_TARGET}=debug"));
        }
        directives
    }

    fn env_filter(&self) -> EnvFilter {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.level.as_str()));

        self.directives()
            .iter()
            .filter_map(|directive| directive.parse().ok())
            .fold(filter, EnvFilter::add_directive)
    }

    fn writer(&self) -> RuntimeResult<BoxMakeWriter> {
        match self.config.output {
            LogOutput::Stdout => Ok(BoxMakeWriter::new(std::io::stdout)),
            LogOutput::Stderr => Ok(BoxMakeWriter::new(std::io::stderr)),
            LogOutput::File => {
                let path = self.config.file_path.as_ref().ok_or_else(|| {
                    RuntimeError::Logging("file output needs logging.file_path".to_string())
                })?;
                let prefix = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "skiff.log".to_string());
                let dir = path
                    .parent()
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."));

                let appender = RollingFileAppender::builder()
                    .rotation(self.config.rotation.rotation())
                    .filename_prefix(prefix)
                    .build(dir)
                    .map_err(|e| RuntimeError::Logging(e.to_string()))?;
                Ok(BoxMakeWriter::new(appender))
            }
        }
    }

    fn fmt_layer(&self) -> RuntimeResult<Box<dyn Layer<Registry> + Send + Sync>> {
        let layer = fmt::layer()
            .with_writer(self.writer()?)
            .with_ansi(self.config.output != LogOutput::File)
            .with_span_events(self.config.dispatch_spans.fmt_span())
            .with_thread_ids(self.config.thread_ids)
            .with_file(self.config.file_location)
            .with_line_number(self.config.file_location);

        Ok(match self.config.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => layer.json().with_current_span(true).boxed(),
            LogFormat::Full => layer.boxed(),
            #[cfg(not(feature = "json-log"))]
            LogFormat::Json => layer.boxed(),
        })
    }

    /// Installs the subscriber.
    pub fn try_init(self) -> RuntimeResult<()> {
        let layer = self.fmt_layer()?;
        tracing_subscriber::registry()
            .with(layer)
            .with(self.env_filter())
            .try_init()
            .map_err(|e| RuntimeError::Logging(e.to_string()))?;

        if cfg!(not(feature = "json-log")) && self.config.format == LogFormat::Json {
            warn!("JSON log format requires the json-log feature, using full format");
        }
        Ok(())
    }
}
