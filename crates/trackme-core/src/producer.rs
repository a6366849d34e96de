//! Producer capability.
//!
//! A producer turns some sample source (a platform sensor callback, a polled
//! native device, a generator or a recorded file) into events on an
//! [`EventSender`]. Every producer obeys the same stream contract:
//!
//! 1. exactly one Start before any data event
//! 2. data events in arrival order
//! 3. exactly one Stop as the last action of its sampling context
//!
//! [`SentinelGuard`] implements the sentinel half of that contract so that
//! individual producers only deal with data.

use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::event::{Event, EventKind};
use crate::queue::EventSender;

/// A source of sensor events.
///
/// Implementations own one sampling context (usually an OS thread) that is
/// created by [`start`](Producer::start) and joined by
/// [`stop`](Producer::stop).
pub trait Producer: Send {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Declare a sensor kind to sample. Only valid before `start`.
    fn add_source(&mut self, kind: EventKind) -> Result<()>;

    /// Begin sampling into `queue`.
    ///
    /// Start is pushed from the sampling context, so this returns without
    /// blocking even on a bounded queue.
    fn start(&mut self, queue: EventSender) -> Result<()>;

    /// Stop sampling.
    ///
    /// Returns after the sampling context has exited and Stop is in the
    /// queue. Calling it on a producer that already finished is a no-op.
    fn stop(&mut self) -> Result<()>;

    /// Whether the sampling context is alive.
    fn is_running(&self) -> bool;
}

impl<P: Producer + ?Sized> Producer for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn add_source(&mut self, kind: EventKind) -> Result<()> {
        (**self).add_source(kind)
    }

    fn start(&mut self, queue: EventSender) -> Result<()> {
        (**self).start(queue)
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }
}

/// Start/Stop bookkeeping for one producer session.
///
/// [`open`](Self::open) pushes Start. Stop is pushed exactly once, either by
/// [`finish`](Self::finish) or, if the sampling context exits any other way,
/// when the guard is dropped.
#[derive(Debug)]
pub struct SentinelGuard {
    producer: String,
    queue: EventSender,
    data_events: u64,
    stopped: bool,
}

impl SentinelGuard {
    /// Push Start and return the guard for the rest of the session.
    pub fn open(producer: impl Into<String>, queue: EventSender) -> Result<Self> {
        let producer = producer.into();
        queue.push(Event::start())?;
        debug!(producer = %producer, "Stream started");
        Ok(Self {
            producer,
            queue,
            data_events: 0,
            stopped: false,
        })
    }

    /// Push a data event.
    ///
    /// Control events are refused; the guard owns the sentinels.
    pub fn push(&mut self, event: Event) -> Result<()> {
        if event.is_control() {
            return Err(PipelineError::producer(
                &self.producer,
                format!("{} is a control event", event.kind()),
            ));
        }
        self.queue.push(event)?;
        self.data_events += 1;
        Ok(())
    }

    /// Number of data events pushed so far.
    pub fn data_events(&self) -> u64 {
        self.data_events
    }

    /// Push Stop and end the session.
    pub fn finish(mut self) -> Result<()> {
        self.push_stop()
    }

    fn push_stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        match self.queue.push(Event::stop()) {
            Ok(()) => {
                debug!(
                    producer = %self.producer,
                    events = self.data_events,
                    "Stream stopped"
                );
                Ok(())
            }
            Err(PipelineError::QueueClosed) => {
                warn!(producer = %self.producer, "Consumer gone before Stop");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for SentinelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.push_stop() {
            warn!(producer = %self.producer, error = %e, "Failed to push Stop");
        }
    }
}
