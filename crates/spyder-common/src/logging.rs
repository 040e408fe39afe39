//! Logging configuration and subscriber setup.
//!
//! The worker itself only emits `tracing` events; whoever hosts it picks a
//! subscriber through [`LogConfig`].

use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Environment variable holding a filter directive, e.g. `spyder_sw=debug`.
pub const LOG_ENV: &str = "SPYDER_LOG";

/// Environment variable selecting the output format (`pretty`, `compact`, `json`).
pub const LOG_FORMAT_ENV: &str = "SPYDER_LOG_FORMAT";

/// Errors raised while installing a subscriber.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("Invalid filter directive: {0}")]
    InvalidFilter(String),

    #[error("Unknown log format: {0}")]
    UnknownFormat(String),

    #[error("A global subscriber is already installed")]
    AlreadyInitialized,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-field output.
    #[default]
    Pretty,
    /// Single line per event.
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(LogError::UnknownFormat(other.to_string())),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used when no filter is given.
    pub level: Level,
    /// Output format.
    pub format: LogFormat,
    /// Include file and line of each event.
    pub include_location: bool,
    /// Include thread names.
    pub include_thread_names: bool,
    /// Emit span enter/close events.
    pub include_span_events: bool,
    /// Filter directive overriding `level`.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            include_location: false,
            include_thread_names: false,
            include_span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Verbose configuration for local debugging.
    pub fn debug() -> Self {
        Self {
            level: Level::DEBUG,
            include_location: true,
            include_span_events: true,
            ..Default::default()
        }
    }

    /// Everything, including per-response traces.
    pub fn trace() -> Self {
        Self {
            level: Level::TRACE,
            include_location: true,
            include_thread_names: true,
            include_span_events: true,
            ..Default::default()
        }
    }

    /// JSON at info level.
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Json,
            ..Default::default()
        }
    }

    /// Read `SPYDER_LOG` and `SPYDER_LOG_FORMAT` on top of the defaults.
    ///
    /// An unknown format name is reported instead of silently ignored.
    pub fn from_env() -> Result<Self, LogError> {
        let mut config = Self::default();
        if let Ok(filter) = std::env::var(LOG_ENV) {
            if !filter.trim().is_empty() {
                config.filter = Some(filter);
            }
        }
        if let Ok(format) = std::env::var(LOG_FORMAT_ENV) {
            config.format = format.parse()?;
        }
        Ok(config)
    }

    /// Set a custom filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, LogError> {
        match self.filter {
            Some(ref directive) => EnvFilter::try_new(directive)
                .map_err(|e| LogError::InvalidFilter(format!("{directive}: {e}"))),
            None => Ok(EnvFilter::new(self.level.to_string())),
        }
    }
}

/// Install a global subscriber, reporting failures.
pub fn try_init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = config.env_filter()?;

    let span_events = if config.include_span_events {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let result = match config.format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_names(config.include_thread_names)
                .with_span_events(span_events);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_target(true)
                .with_span_events(span_events);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer().json().with_span_events(span_events);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
    };

    result.map_err(|_| LogError::AlreadyInitialized)
}

/// Install a global subscriber.
///
/// Falls back to the configured level when the filter is invalid and does
/// nothing if a subscriber is already installed.
pub fn init_logging(config: LogConfig) {
    match try_init_logging(&config) {
        Ok(()) | Err(LogError::AlreadyInitialized) => {}
        Err(e) => {
            let fallback = LogConfig {
                filter: None,
                ..config
            };
            let _ = try_init_logging(&fallback);
            tracing::warn!(error = %e, "Ignoring log filter");
        }
    }
}
