//! Error types for the sensor pipeline.
//!
//! [`PipelineError`] is the single error type shared by producers, the queue,
//! the sink runner and the lifecycle controller. Codec failures have their own
//! small enums ([`ParseError`], [`DecodeError`]) that convert into it with `?`.
//!
//! ## Propagation
//!
//! - **`SinkOpen`** and **`SinkWrite`** abort the sink runner and are surfaced
//!   to the controller, which stops the producer. Nothing is retried here.
//! - **`Parse`** and **`Decode`** stay local to the decode path and never abort
//!   the binary write path.
//! - **`QueueContractViolation`** means a producer broke the Start/Stop
//!   protocol. A correct producer never triggers it.

use thiserror::Error;

/// Convenience alias for results using the pipeline error type.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Malformed text record (`kind\ttimestamp\tv0\tv1\tv2`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line did not contain exactly five whitespace-separated tokens.
    #[error("expected 5 tokens, found {found}")]
    TokenCount {
        /// Number of tokens found on the line
        found: usize,
    },

    /// A token could not be parsed as the number its field requires.
    #[error("invalid {field} '{token}'")]
    InvalidNumber {
        /// Field name (kind, timestamp, v0, v1, v2)
        field: &'static str,
        /// The offending token
        token: String,
    },

    /// The kind code is a valid byte but names no known kind.
    #[error("unknown event kind code {0:#04x}")]
    UnknownKind(u8),
}

/// Malformed binary record.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The slice is not exactly one record long.
    #[error("record must be {expected} bytes, got {actual}")]
    Length {
        /// Required record size
        expected: usize,
        /// Size of the provided slice
        actual: usize,
    },

    /// The record does not start with the magic value.
    #[error("bad magic number {0:#010x}")]
    Magic(u32),

    /// The kind byte names no known kind.
    #[error("unknown event kind code {0:#04x}")]
    UnknownKind(u8),
}

/// Primary error type for the sensor pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A text record could not be parsed.
    #[error("Text record parse error: {0}")]
    Parse(#[from] ParseError),

    /// A binary record could not be decoded.
    #[error("Binary record decode error: {0}")]
    Decode(#[from] DecodeError),

    /// An event was constructed with a value count other than three.
    #[error("Event requires exactly 3 values, got {0}")]
    InvalidEvent(usize),

    /// A sink could not be opened before the runner entered `Running`.
    ///
    /// Covers a directory that cannot be created, read-only or missing
    /// storage, and a network endpoint that refuses or times out.
    #[error("Failed to open {sink} sink: {source}")]
    SinkOpen {
        /// Human-readable sink description (path or host:port)
        sink: String,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A sink write failed while the runner was `Running`.
    #[error("Failed to write to {sink} sink: {source}")]
    SinkWrite {
        /// Human-readable sink description (path or host:port)
        sink: String,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A producer broke the Start/Stop protocol.
    #[error("Queue contract violation: {0}")]
    QueueContractViolation(String),

    /// The consumer side of the queue is gone.
    #[error("Event queue closed")]
    QueueClosed,

    /// A producer failed to start or stop.
    #[error("Producer '{producer}' error: {message}")]
    Producer {
        /// Producer name
        producer: String,
        /// What went wrong
        message: String,
    },

    /// Configuration values are semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A background task (sink runner, producer shutdown) panicked or was
    /// cancelled.
    #[error("Background task failed: {0}")]
    Task(String),
}

impl PipelineError {
    /// Build a [`PipelineError::Producer`] error.
    pub fn producer(producer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Producer {
            producer: producer.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from a sink (open or write).
    pub fn is_sink_error(&self) -> bool {
        matches!(self, Self::SinkOpen { .. } | Self::SinkWrite { .. })
    }
}
