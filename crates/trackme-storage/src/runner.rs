//! Sink runner: the single consumer of the event queue.
//!
//! The runner is a small state machine. Configuration happens on an idle
//! [`SinkRunner`]; [`SinkRunner::open`] opens every sink and yields an
//! [`ActiveRunner`], whose [`run`](ActiveRunner::run) loop drains the queue:
//!
//! ```text
//!   Idle ──open──► Running ──Stop popped──► Draining ──sinks closed──► Closed
//!                     │
//!                     └── write error / queue closed ──► Closed (Err)
//! ```
//!
//! Every event is encoded once and written to every sink in configuration
//! order before the next pop, so all sinks see the same bytes in the same
//! order. The Stop record is written to every sink before they are closed in
//! reverse configuration order.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use trackme_core::{encode, EventReceiver, PipelineError, Result, RECORD_SIZE};

use crate::sink::{default_file_name, FileSink, NetworkSink, RecordSink, DEFAULT_CONNECT_TIMEOUT};

/// Lifecycle state of the sink runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    /// Configurable, nothing open
    Idle,
    /// Sinks open, consuming events
    Running,
    /// Stop written, closing sinks
    Draining,
    /// All sinks closed
    Closed,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunnerState::Idle => "idle",
            RunnerState::Running => "running",
            RunnerState::Draining => "draining",
            RunnerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

enum Configured {
    File { directory: std::path::PathBuf, name: String },
    Network { host: String, port: u16 },
    Custom(Box<dyn RecordSink>),
}

impl fmt::Debug for Configured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Configured::File { directory, name } => {
                write!(f, "File({})", directory.join(name).display())
            }
            Configured::Network { host, port } => write!(f, "Network({host}:{port})"),
            Configured::Custom(sink) => write!(f, "Custom({})", sink.describe()),
        }
    }
}

/// Sink runner in the `Idle` state.
#[derive(Debug)]
pub struct SinkRunner {
    configured: Vec<Configured>,
    connect_timeout: Duration,
}

impl Default for SinkRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkRunner {
    /// Create a runner with no sinks.
    pub fn new() -> Self {
        Self {
            configured: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Configure the file sink, replacing any earlier file configuration.
    ///
    /// `None` picks `<unix-millis>.sns` at configuration time.
    pub fn set_file(
        &mut self,
        directory: impl Into<std::path::PathBuf>,
        name: Option<String>,
    ) -> &mut Self {
        let entry = Configured::File {
            directory: directory.into(),
            name: name.unwrap_or_else(default_file_name),
        };
        self.replace_or_push(entry, |c| matches!(c, Configured::File { .. }));
        self
    }

    /// Configure the network sink, replacing any earlier network configuration.
    pub fn set_network(&mut self, host: impl Into<String>, port: u16) -> &mut Self {
        let entry = Configured::Network {
            host: host.into(),
            port,
        };
        self.replace_or_push(entry, |c| matches!(c, Configured::Network { .. }));
        self
    }

    /// Add an already-open sink.
    pub fn add_sink(&mut self, sink: Box<dyn RecordSink>) -> &mut Self {
        self.configured.push(Configured::Custom(sink));
        self
    }

    /// Connect timeout for the network sink.
    pub fn set_connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.connect_timeout = timeout;
        self
    }

    /// Number of configured sinks.
    pub fn len(&self) -> usize {
        self.configured.len()
    }

    /// Whether no sink is configured.
    pub fn is_empty(&self) -> bool {
        self.configured.is_empty()
    }

    /// Always [`RunnerState::Idle`].
    pub fn state(&self) -> RunnerState {
        RunnerState::Idle
    }

    fn replace_or_push(&mut self, entry: Configured, same: impl Fn(&Configured) -> bool) {
        match self.configured.iter_mut().find(|c| same(c)) {
            Some(slot) => *slot = entry,
            None => self.configured.push(entry),
        }
    }

    /// Open every sink in configuration order.
    ///
    /// On the first failure the sinks opened so far are closed and the
    /// failure is returned; the runner never reaches `Running`.
    pub async fn open(self) -> Result<ActiveRunner> {
        if self.configured.is_empty() {
            return Err(PipelineError::Configuration(
                "no output sink configured".to_string(),
            ));
        }

        let mut opened: Vec<SinkSlot> = Vec::with_capacity(self.configured.len());
        for entry in self.configured {
            let sink: Result<Box<dyn RecordSink>> = match entry {
                Configured::File { directory, name } => FileSink::open(&directory, &name)
                    .await
                    .map(|s| Box::new(s) as Box<dyn RecordSink>),
                Configured::Network { host, port } => {
                    NetworkSink::connect(&host, port, self.connect_timeout)
                        .await
                        .map(|s| Box::new(s) as Box<dyn RecordSink>)
                }
                Configured::Custom(sink) => Ok(sink),
            };

            match sink {
                Ok(sink) => opened.push(SinkSlot::new(sink)),
                Err(e) => {
                    error!(error = %e, "Failed to open sink, closing the others");
                    close_all(&mut opened).await;
                    return Err(e);
                }
            }
        }

        Ok(ActiveRunner {
            sinks: opened,
            state: RunnerState::Idle,
        })
    }
}

struct SinkSlot {
    name: String,
    sink: Box<dyn RecordSink>,
    records: u64,
}

impl SinkSlot {
    fn new(sink: Box<dyn RecordSink>) -> Self {
        Self {
            name: sink.describe(),
            sink,
            records: 0,
        }
    }
}

/// Records written to one sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    /// Sink description
    pub sink: String,
    /// Records written successfully
    pub records: u64,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Events popped from the queue, Start and Stop included
    pub events: u64,
    /// Per-sink record counts, in configuration order
    pub sinks: Vec<SinkStats>,
    /// Final runner state
    pub state: RunnerState,
}

/// Sink runner with every sink open.
pub struct ActiveRunner {
    sinks: Vec<SinkSlot>,
    state: RunnerState,
}

impl fmt::Debug for ActiveRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveRunner")
            .field("sinks", &self.sink_names())
            .field("state", &self.state)
            .finish()
    }
}

impl ActiveRunner {
    /// Descriptions of the open sinks, in configuration order.
    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name.clone()).collect()
    }

    /// Current state.
    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Consume events until Stop, a write failure or a closed queue.
    pub async fn run(mut self, mut queue: EventReceiver) -> Result<RunSummary> {
        self.state = RunnerState::Running;
        info!(sinks = ?self.sink_names(), "Sink runner running");
        let mut events = 0u64;

        loop {
            let Some(event) = queue.pop().await else {
                warn!(events, "Queue closed before Stop");
                self.abort().await;
                return Err(PipelineError::QueueContractViolation(
                    "every producer handle dropped before Stop".to_string(),
                ));
            };
            events += 1;

            let record = encode(&event);
            if let Err(e) = self.write_to_all(&record).await {
                self.abort().await;
                return Err(e);
            }

            if event.is_stop() {
                break;
            }
        }

        self.state = RunnerState::Draining;
        debug!(events, "Stop written, draining sinks");
        let closed = self.close_reverse().await;
        self.state = RunnerState::Closed;

        let summary = RunSummary {
            events,
            sinks: self
                .sinks
                .iter()
                .map(|s| SinkStats {
                    sink: s.name.clone(),
                    records: s.records,
                })
                .collect(),
            state: self.state,
        };
        closed?;
        info!(events, "Sink runner closed");
        Ok(summary)
    }

    /// Write one record to every sink; report the first failure.
    async fn write_to_all(&mut self, record: &[u8; RECORD_SIZE]) -> Result<()> {
        let mut first_error = None;
        for slot in &mut self.sinks {
            match slot.sink.write_record(record).await {
                Ok(()) => slot.records += 1,
                Err(source) => {
                    error!(sink = %slot.name, error = %source, "Sink write failed");
                    if first_error.is_none() {
                        first_error = Some(PipelineError::SinkWrite {
                            sink: slot.name.clone(),
                            source,
                        });
                    }
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Close every sink in reverse order; the first close failure is returned.
    async fn close_reverse(&mut self) -> Result<()> {
        let mut first_error = None;
        for slot in self.sinks.iter_mut().rev() {
            if let Err(source) = slot.sink.close().await {
                error!(sink = %slot.name, error = %source, "Sink close failed");
                if first_error.is_none() {
                    first_error = Some(PipelineError::SinkWrite {
                        sink: slot.name.clone(),
                        source,
                    });
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn abort(&mut self) {
        close_all(&mut self.sinks).await;
        self.state = RunnerState::Closed;
    }
}

/// Best-effort close in reverse order, logging failures.
async fn close_all(sinks: &mut [SinkSlot]) {
    for slot in sinks.iter_mut().rev() {
        if let Err(e) = slot.sink.close().await {
            warn!(sink = %slot.name, error = %e, "Sink close failed");
        }
    }
}
