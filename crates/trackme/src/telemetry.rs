//! Log output for trackme processes.
//!
//! A single `tracing-subscriber` registry is installed with an [`EnvFilter`]
//! and one of three formats:
//! - **pretty**: multi-line, coloured, for interactive use
//! - **compact**: one line per event, no colours
//! - **json**: one JSON object per event, for log collectors
//!
//! `RUST_LOG` takes precedence over the configured level. Log lines go to
//! stderr so that `trackme dump` output on stdout stays clean.
//!
//! # Example
//! ```no_run
//! use trackme::telemetry::{self, LogFormat, LoggingConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! telemetry::init(&LoggingConfig::new("debug").with_format(LogFormat::Json))?;
//! tracing::info!(sinks = 2, "Recording started");
//! # Ok(())
//! # }
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};
use trackme_core::{PipelineError, Result};

const ALREADY_SET: &str = "a global default trace dispatcher has already been set";

/// Levels accepted in `[logging] level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line with colours (development)
    #[default]
    Pretty,
    /// Single line without colours
    Compact,
    /// Structured JSON (log aggregation)
    Json,
}

/// The `[logging]` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
    /// Emit span open/close events
    #[serde(default)]
    pub span_events: bool,
    /// Include source file and line
    #[serde(default)]
    pub file_and_line: bool,
    /// Include thread names (producer threads are named `trackme-<producer>`)
    #[serde(default = "default_true")]
    pub thread_names: bool,
    /// ANSI colours for the pretty format
    #[serde(default = "default_true")]
    pub ansi: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(default_level())
    }
}

impl LoggingConfig {
    /// Settings with the given level and default options.
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            span_events: false,
            file_and_line: false,
            thread_names: true,
            ansi: true,
        }
    }

    /// Set output format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable span events
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Enable or disable ANSI colours
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }
}

/// Install the global subscriber.
///
/// Calling it again after a subscriber is in place is a no-op, so tests and
/// embedding applications can call it freely.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_to_filter_string(level)));
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_span_events(span_events)
            .with_file(config.file_and_line)
            .with_line_number(config.file_and_line)
            .with_thread_names(config.thread_names)
            .with_ansi(config.ansi)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_span_events(span_events)
            .with_file(config.file_and_line)
            .with_line_number(config.file_and_line)
            .with_thread_names(config.thread_names)
            .with_ansi(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(span_events)
            .with_file(config.file_and_line)
            .with_line_number(config.file_and_line)
            .with_thread_names(config.thread_names)
            .boxed(),
    };

    match tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
    {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains(ALREADY_SET) => Ok(()),
        Err(e) => Err(e).context("failed to install the log subscriber"),
    }
}

/// Parse a level name, case-insensitively.
pub fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(PipelineError::Configuration(format!(
            "invalid log level '{level}', must be one of: {}",
            LOG_LEVELS.join(", ")
        ))),
    }
}

fn level_to_filter_string(level: Level) -> String {
    level.as_str().to_ascii_lowercase()
}
