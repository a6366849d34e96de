//! Output side of the trackme pipeline.
//!
//! - [`sink`]: the [`RecordSink`] trait with its file and network implementations
//! - [`runner`]: the [`SinkRunner`] that drains the event queue into every sink
//! - [`listener`] / [`recorder`]: the receiving end of a network sink, recording
//!   one remote session at a time to a file
//!
//! # Example
//!
//! ```rust,no_run
//! use trackme_core::{event_queue, Event, QueuePolicy};
//! use trackme_storage::SinkRunner;
//!
//! # async fn example() -> trackme_core::Result<()> {
//! let mut runner = SinkRunner::new();
//! runner.set_file("/tmp/trackme", Some("demo.sns".into()));
//! runner.set_network("192.168.0.10", 50000);
//! let active = runner.open().await?;
//!
//! let (tx, rx) = event_queue(QueuePolicy::Unbounded);
//! let task = tokio::spawn(active.run(rx));
//! tx.push(Event::start())?;
//! tx.push(Event::stop())?;
//! let summary = task.await.expect("runner task")?;
//! println!("{} events written", summary.events);
//! # Ok(())
//! # }
//! ```

pub mod listener;
pub mod recorder;
pub mod runner;
pub mod sink;

pub use listener::{RemoteStream, StreamListener, DEFAULT_LISTEN_PORT};
pub use recorder::{RecordingSummary, SessionRecorder};
pub use runner::{ActiveRunner, RunSummary, RunnerState, SinkRunner, SinkStats};
pub use sink::{
    default_file_name, FileSink, FileSpec, NetworkSink, NetworkSpec, RecordSink,
    DEFAULT_CONNECT_TIMEOUT,
};
