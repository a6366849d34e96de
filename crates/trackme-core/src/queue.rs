//! FIFO between sensor producers and the sink runner.
//!
//! [`event_queue`] returns a clonable [`EventSender`] for producer threads and
//! a single [`EventReceiver`] for the runner. The sending side enforces the
//! stream contract: once a Stop event has been pushed, every further push
//! fails with [`PipelineError::QueueContractViolation`].
//!
//! # Backpressure
//!
//! The default [`QueuePolicy::Unbounded`] never blocks a producer. With
//! [`QueuePolicy::Bounded`], [`EventSender::push`] blocks the calling thread
//! while the queue is full. Bounded pushes must therefore come from plain OS
//! threads (or `spawn_blocking`), never from inside an async task.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{PipelineError, Result};
use crate::event::Event;

/// Capacity policy of the event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Producers never block; memory grows with the backlog.
    #[default]
    Unbounded,
    /// Producers block while `capacity` events are waiting.
    Bounded {
        /// Maximum number of queued events (raised to 1 if zero)
        capacity: usize,
    },
}

#[derive(Debug, Clone)]
enum Tx {
    Unbounded(mpsc::UnboundedSender<Event>),
    Bounded(mpsc::Sender<Event>),
}

#[derive(Debug)]
enum Rx {
    Unbounded(mpsc::UnboundedReceiver<Event>),
    Bounded(mpsc::Receiver<Event>),
}

/// Create a new event queue.
pub fn event_queue(policy: QueuePolicy) -> (EventSender, EventReceiver) {
    let (tx, rx) = match policy {
        QueuePolicy::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Tx::Unbounded(tx), Rx::Unbounded(rx))
        }
        QueuePolicy::Bounded { capacity } => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (Tx::Bounded(tx), Rx::Bounded(rx))
        }
    };

    let sender = EventSender {
        tx,
        stopped: Arc::new(Mutex::new(false)),
    };
    (sender, EventReceiver { rx })
}

/// Producer handle of the event queue.
///
/// Clones share the same Stop gate, so the contract holds across every
/// producer thread feeding one queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Tx,
    stopped: Arc<Mutex<bool>>,
}

impl EventSender {
    /// Enqueue an event.
    ///
    /// Fails with `QueueContractViolation` after Stop has been pushed and with
    /// `QueueClosed` when the receiver is gone.
    pub fn push(&self, event: Event) -> Result<()> {
        // Held across the send so no event can slip in behind a Stop.
        let mut stopped = self.stopped.lock();
        if *stopped {
            return Err(PipelineError::QueueContractViolation(format!(
                "{} event pushed after Stop",
                event.kind()
            )));
        }

        let sent = match &self.tx {
            Tx::Unbounded(tx) => tx.send(event).is_ok(),
            Tx::Bounded(tx) => tx.blocking_send(event).is_ok(),
        };
        if !sent {
            return Err(PipelineError::QueueClosed);
        }

        if event.is_stop() {
            *stopped = true;
        }
        Ok(())
    }

    /// Whether a Stop event has gone through this queue.
    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Whether the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        match &self.tx {
            Tx::Unbounded(tx) => tx.is_closed(),
            Tx::Bounded(tx) => tx.is_closed(),
        }
    }
}

/// Consumer handle of the event queue. There is exactly one per queue.
#[derive(Debug)]
pub struct EventReceiver {
    rx: Rx,
}

impl EventReceiver {
    /// Wait for the next event.
    ///
    /// Returns `None` once every sender is dropped and the queue is empty.
    pub async fn pop(&mut self) -> Option<Event> {
        match &mut self.rx {
            Rx::Unbounded(rx) => rx.recv().await,
            Rx::Bounded(rx) => rx.recv().await,
        }
    }

    /// Blocking variant of [`pop`](Self::pop) for plain threads.
    pub fn blocking_pop(&mut self) -> Option<Event> {
        match &mut self.rx {
            Rx::Unbounded(rx) => rx.blocking_recv(),
            Rx::Bounded(rx) => rx.blocking_recv(),
        }
    }
}
