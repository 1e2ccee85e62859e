//! Installs the global `tracing` subscriber.
//!
//! The consumer loop wraps every fetched event in an `event` span (DEBUG) and
//! each identifier it dispatches in a nested `dispatch` span (TRACE).
//! [`SpanEvents::DISPATCH`] writes one line with busy and idle time whenever
//! one of those spans closes, which is usually all that is needed to see where
//! handler time goes.
//!
//! ```rust,ignore
//! use ircbus_runtime::config::LogLevel;
//! use ircbus_runtime::logging::{LoggingBuilder, SpanEvents};
//!
//! LoggingBuilder::new()
//!     .level(LogLevel::Debug)
//!     .directive("ircbus_core::context=trace")
//!     .span_events(SpanEvents::DISPATCH)
//!     .try_init()?;
//! ```

use std::path::Path;

use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig};

/// Used when file output has no usable file name.
const DEFAULT_LOG_FILE: &str = "ircbus.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Cannot open log file: {0}")]
    LogFile(#[from] InitError),

    /// Another global subscriber was installed first.
    #[error("A global subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Which span lifecycle events are written to the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanEvents {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

impl SpanEvents {
    pub const NONE: Self = Self {
        new: false,
        enter: false,
        exit: false,
        close: false,
    };

    /// One line per closed `event` or `dispatch` span, with its timing.
    pub const DISPATCH: Self = Self {
        close: true,
        ..Self::NONE
    };

    /// Creation and close of every span.
    pub const LIFECYCLE: Self = Self {
        new: true,
        close: true,
        ..Self::NONE
    };

    pub const FULL: Self = Self {
        new: true,
        enter: true,
        exit: true,
        close: true,
    };

    fn fmt_span(self) -> FmtSpan {
        [
            (self.new, FmtSpan::NEW),
            (self.enter, FmtSpan::ENTER),
            (self.exit, FmtSpan::EXIT),
            (self.close, FmtSpan::CLOSE),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .fold(FmtSpan::NONE, |all, (_, kind)| all | kind)
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(config: &SpanEventConfig) -> Self {
        Self {
            new: config.new,
            enter: config.enter,
            exit: config.exit,
            close: config.close,
        }
    }
}

/// Installs a subscriber described by `config`.
pub fn init_from_config(config: &LoggingConfig) -> Result<(), LoggingError> {
    LoggingBuilder::from_config(config).try_init()
}

/// Subscriber settings, seeded from a [`LoggingConfig`] and adjusted in code.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    config: LoggingConfig,
    span_events: SpanEvents,
    extra_directives: Vec<String>,
    with_target: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::from_config(&LoggingConfig::default())
    }
}

impl LoggingBuilder {
    /// Compact lines on stdout at `info`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            config: config.clone(),
            span_events: SpanEvents::from(&config.span_events),
            extra_directives: Vec::new(),
            with_target: true,
        }
    }

    /// Level used when `RUST_LOG` is unset.
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Adds a filter directive such as `ircbus_core::signal=trace`.
    ///
    /// Directives that do not parse are skipped with a warning.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.extra_directives.push(directive.into());
        self
    }

    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    /// Appends to `path` instead of a standard stream.
    pub fn to_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config.output = LogOutput::File;
        self.config.file_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Shows the id and name of the logging thread.
    pub fn thread_ids(mut self, enabled: bool) -> Self {
        self.config.thread_ids = enabled;
        self
    }

    pub fn file_location(mut self, enabled: bool) -> Self {
        self.config.file_location = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Installs the subscriber as the global default.
    pub fn try_init(self) -> Result<(), LoggingError> {
        let filter = self.build_filter();
        let layer = self.fmt_layer(self.make_writer()?);
        tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init()?;
        Ok(())
    }

    /// Per-target levels from the config in target order, then the
    /// directives added in code.
    fn directives(&self) -> Vec<String> {
        let mut targets: Vec<_> = self.config.filters.iter().collect();
        targets.sort_by(|a, b| a.0.cmp(b.0));
        targets
            .into_iter()
            .map(|(target, level)| format!("{target}={level}"))
            .chain(self.extra_directives.iter().cloned())
            .collect()
    }

    fn build_filter(&self) -> EnvFilter {
        let base = LevelFilter::from_level(self.config.level.to_tracing_level());
        let filter = EnvFilter::builder()
            .with_default_directive(base.into())
            .from_env_lossy();

        self.directives()
            .into_iter()
            .fold(filter, |filter, directive| match directive.parse() {
                Ok(parsed) => filter.add_directive(parsed),
                Err(error) => {
                    warn!(%directive, %error, "Ignoring invalid log directive");
                    filter
                }
            })
    }

    fn make_writer(&self) -> Result<BoxMakeWriter, InitError> {
        let path = match self.config.output {
            LogOutput::Stdout => return Ok(BoxMakeWriter::new(std::io::stdout)),
            LogOutput::Stderr => return Ok(BoxMakeWriter::new(std::io::stderr)),
            LogOutput::File => self
                .config
                .file_path
                .as_deref()
                .unwrap_or(Path::new(DEFAULT_LOG_FILE)),
        };

        let directory = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .map_or_else(|| DEFAULT_LOG_FILE.into(), |name| name.to_string_lossy());

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name)
            .build(directory)?;
        Ok(BoxMakeWriter::new(appender))
    }

    fn fmt_layer(&self, writer: BoxMakeWriter) -> BoxedLayer {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_span_events(self.span_events.fmt_span())
            .with_target(self.with_target)
            .with_thread_ids(self.config.thread_ids)
            .with_thread_names(self.config.thread_ids)
            .with_file(self.config.file_location)
            .with_line_number(self.config.file_location);

        match self.config.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Full => layer.boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => layer.json().boxed(),
        }
    }
}
