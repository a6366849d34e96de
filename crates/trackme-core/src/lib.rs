//! `trackme-core`
//!
//! Core types for the trackme sensor stream.
//!
//! Sensor producers push [`Event`]s into an [`EventSender`]; a single consumer
//! drains the matching [`EventReceiver`] and writes each event as a fixed
//! 25-byte record (see [`codec`]). Lifecycle is signaled in-band: every stream
//! starts with a [`EventKind::Start`] event and ends with exactly one
//! [`EventKind::Stop`] event.
//!
//! ## Key Types
//!
//! - [`Event`] / [`EventKind`]: immutable timestamped sample or control signal
//! - [`codec`]: binary record encode/decode and the resynchronising [`RecordDecoder`]
//! - [`event_queue`]: FIFO between producer threads and the sink runner
//! - [`Producer`]: the capability every sensor producer implements
//! - [`PipelineError`]: error taxonomy shared by every crate in the workspace
//!
//! ## Example
//!
//! ```rust
//! use trackme_core::{event_queue, Event, EventKind, QueuePolicy};
//!
//! let (tx, mut rx) = event_queue(QueuePolicy::Unbounded);
//! tx.push(Event::start()).unwrap();
//! tx.push(Event::new(EventKind::Accelerometer, 1_000, [0.1, 0.2, 9.8])).unwrap();
//! tx.push(Event::stop()).unwrap();
//!
//! assert_eq!(rx.blocking_pop().unwrap().kind(), EventKind::Start);
//! ```

pub mod codec;
pub mod error;
pub mod event;
pub mod producer;
pub mod queue;

pub use codec::{decode, decode_all, encode, RecordDecoder, MAGIC, RECORD_SIZE};
pub use error::{DecodeError, ParseError, PipelineError, Result};
pub use event::{Event, EventKind};
pub use producer::{Producer, SentinelGuard};
pub use queue::{event_queue, EventReceiver, EventSender, QueuePolicy};
