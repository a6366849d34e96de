//! Native-driven producer.
//!
//! A worker thread repeatedly polls a [`SampleSource`] and pushes every sample
//! into the event queue. This is the shape of drivers that own their sampling
//! loop, such as a native sensor queue or a file being replayed:
//!
//! ```text
//!   start()                         stop()
//!     │                               │
//!     ▼                               ▼
//!   Start ─► enable ─► poll ─► push ─► ... ─► disable ─► Stop
//!                       ▲      │
//!                       └──────┘  until stopped or Exhausted
//! ```
//!
//! When the source reports [`SourcePoll::Exhausted`] the worker emits Stop
//! itself and exits; a later [`Producer::stop`] only joins the thread.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use trackme_core::{Event, EventKind, EventSender, PipelineError, Producer, Result, SentinelGuard};

use crate::common::worker::Worker;

/// Upper bound on a single poll so that `stop()` is observed promptly.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Outcome of one [`SampleSource::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePoll {
    /// A sample is ready.
    Sample(Event),
    /// Nothing arrived within the timeout.
    Idle,
    /// The source has no more samples.
    Exhausted,
}

/// A pollable sample source.
///
/// Lives on the producer's worker thread for the duration of a session and
/// is handed back when the thread is joined.
pub trait SampleSource: Send + std::fmt::Debug + 'static {
    /// Begin delivering samples of the given kinds.
    fn enable(&mut self, kinds: &[EventKind]) -> Result<()>;

    /// Wait up to `timeout` for the next sample.
    fn poll(&mut self, timeout: Duration) -> Result<SourcePoll>;

    /// Stop delivering samples.
    fn disable(&mut self);
}

impl SampleSource for Box<dyn SampleSource> {
    fn enable(&mut self, kinds: &[EventKind]) -> Result<()> {
        (**self).enable(kinds)
    }

    fn poll(&mut self, timeout: Duration) -> Result<SourcePoll> {
        (**self).poll(timeout)
    }

    fn disable(&mut self) {
        (**self).disable()
    }
}

/// Producer that drives a [`SampleSource`] from its own thread.
#[derive(Debug)]
pub struct PollingProducer<S: SampleSource> {
    name: String,
    sources: Vec<EventKind>,
    source: Option<S>,
    worker: Worker<S>,
}

impl<S: SampleSource> PollingProducer<S> {
    /// Wrap a source.
    pub fn new(name: impl Into<String>, source: S) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
            source: Some(source),
            worker: Worker::new(),
        }
    }

    /// Declared sensor kinds.
    pub fn sources(&self) -> &[EventKind] {
        &self.sources
    }

    /// Join a worker that finished on its own and take the source back.
    fn reclaim(&mut self) {
        if !self.worker.is_running() {
            if let Some(source) = self.worker.join(&self.name) {
                self.source = Some(source);
            }
        }
    }
}

impl<S: SampleSource> Producer for PollingProducer<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_source(&mut self, kind: EventKind) -> Result<()> {
        if self.worker.is_spawned() {
            return Err(PipelineError::producer(&self.name, "cannot add a source after start"));
        }
        if kind.is_control() {
            return Err(PipelineError::producer(
                &self.name,
                format!("{kind} is not a sensor kind"),
            ));
        }
        if !self.sources.contains(&kind) {
            self.sources.push(kind);
        }
        Ok(())
    }

    fn start(&mut self, queue: EventSender) -> Result<()> {
        self.reclaim();
        let mut source = self
            .source
            .take()
            .ok_or_else(|| PipelineError::producer(&self.name, "already started"))?;

        // No declared kinds: sources sample every sensor and nothing is filtered.
        let filter = self.sources.clone();
        let kinds = if filter.is_empty() {
            EventKind::SENSORS.to_vec()
        } else {
            filter.clone()
        };
        let name = self.name.clone();

        self.worker.spawn(&self.name, move |running| {
            let mut guard = match SentinelGuard::open(&name, queue) {
                Ok(guard) => guard,
                Err(e) => {
                    error!(producer = %name, error = %e, "Failed to open stream");
                    return source;
                }
            };

            if let Err(e) = source.enable(&kinds) {
                error!(producer = %name, error = %e, "Failed to enable source");
                return source;
            }
            info!(producer = %name, kinds = ?kinds, "Sampling started");

            while running.load(Ordering::SeqCst) {
                match source.poll(POLL_TIMEOUT) {
                    Ok(SourcePoll::Sample(event)) => {
                        if !filter.is_empty() && !filter.contains(&event.kind()) {
                            continue;
                        }
                        match guard.push(event) {
                            Ok(()) => {}
                            Err(PipelineError::QueueClosed) => {
                                warn!(producer = %name, "Consumer gone, stopping sampling");
                                break;
                            }
                            Err(e) => {
                                warn!(producer = %name, error = %e, "Dropped sample");
                            }
                        }
                    }
                    Ok(SourcePoll::Idle) => {}
                    Ok(SourcePoll::Exhausted) => {
                        debug!(producer = %name, "Source exhausted");
                        break;
                    }
                    Err(e) => {
                        error!(producer = %name, error = %e, "Poll failed");
                        break;
                    }
                }
            }

            source.disable();
            let events = guard.data_events();
            if let Err(e) = guard.finish() {
                error!(producer = %name, error = %e, "Failed to push Stop");
            }
            info!(producer = %name, events, "Sampling stopped");
            source
        })
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(source) = self.worker.stop(&self.name) {
            self.source = Some(source);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}

impl<S: SampleSource> Drop for PollingProducer<S> {
    fn drop(&mut self) {
        self.worker.stop(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackme_core::{event_queue, EventReceiver, QueuePolicy};

    /// Emits a fixed list of events, then runs dry.
    #[derive(Debug)]
    struct ListSource {
        events: std::vec::IntoIter<Event>,
        enabled: Vec<EventKind>,
        disabled: bool,
    }

    impl ListSource {
        fn new(events: Vec<Event>) -> Self {
            Self {
                events: events.into_iter(),
                enabled: Vec::new(),
                disabled: false,
            }
        }
    }

    impl SampleSource for ListSource {
        fn enable(&mut self, kinds: &[EventKind]) -> Result<()> {
            self.enabled = kinds.to_vec();
            Ok(())
        }

        fn poll(&mut self, _timeout: Duration) -> Result<SourcePoll> {
            Ok(self
                .events
                .next()
                .map_or(SourcePoll::Exhausted, SourcePoll::Sample))
        }

        fn disable(&mut self) {
            self.disabled = true;
        }
    }

    /// Never produces anything until stopped.
    #[derive(Debug)]
    struct IdleSource;

    impl SampleSource for IdleSource {
        fn enable(&mut self, _kinds: &[EventKind]) -> Result<()> {
            Ok(())
        }

        fn poll(&mut self, timeout: Duration) -> Result<SourcePoll> {
            std::thread::sleep(timeout.min(Duration::from_millis(5)));
            Ok(SourcePoll::Idle)
        }

        fn disable(&mut self) {}
    }

    fn drain(rx: &mut EventReceiver) -> Vec<Event> {
        std::iter::from_fn(|| rx.blocking_pop()).collect()
    }

    fn sample(kind: EventKind, ts: i64) -> Event {
        Event::new(kind, ts, [ts as f32, 0.0, 0.0])
    }

    #[test]
    fn test_exhausted_source_emits_stop() {
        let events = vec![
            sample(EventKind::Accelerometer, 1),
            sample(EventKind::Gyroscope, 2),
            sample(EventKind::Accelerometer, 3),
        ];
        let mut producer = PollingProducer::new("list", ListSource::new(events.clone()));
        let (tx, mut rx) = event_queue(QueuePolicy::Unbounded);
        producer.start(tx).unwrap();

        let received = drain(&mut rx);
        assert_eq!(received.first(), Some(&Event::start()));
        assert_eq!(&received[1..4], events.as_slice());
        assert_eq!(received.last(), Some(&Event::stop()));
        assert_eq!(received.len(), 5);

        producer.stop().unwrap();
        assert!(!producer.is_running());
        let source = producer.source.as_ref().unwrap();
        assert!(source.disabled);
        assert_eq!(source.enabled, EventKind::SENSORS.to_vec());
    }

    #[test]
    fn test_declared_sources_filter_samples() {
        let events = vec![
            sample(EventKind::Accelerometer, 1),
            sample(EventKind::Gyroscope, 2),
            sample(EventKind::MagneticField, 3),
        ];
        let mut producer = PollingProducer::new("list", ListSource::new(events));
        producer.add_source(EventKind::Gyroscope).unwrap();
        let (tx, mut rx) = event_queue(QueuePolicy::Unbounded);
        producer.start(tx).unwrap();

        let kinds: Vec<_> = drain(&mut rx).iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Start, EventKind::Gyroscope, EventKind::Stop]
        );
        producer.stop().unwrap();
    }

    #[test]
    fn test_stop_pushes_single_stop() {
        let mut producer = PollingProducer::new("idle", IdleSource);
        let (tx, mut rx) = event_queue(QueuePolicy::Unbounded);
        producer.start(tx).unwrap();
        assert!(producer.is_running());

        std::thread::sleep(Duration::from_millis(20));
        producer.stop().unwrap();
        producer.stop().unwrap();
        assert!(!producer.is_running());

        let kinds: Vec<_> = drain(&mut rx).iter().map(Event::kind).collect();
        assert_eq!(kinds, vec![EventKind::Start, EventKind::Stop]);
    }

    #[test]
    fn test_add_source_rules() {
        let mut producer = PollingProducer::new("idle", IdleSource);
        assert!(producer.add_source(EventKind::Stop).is_err());
        producer.add_source(EventKind::Orientation).unwrap();
        producer.add_source(EventKind::Orientation).unwrap();
        assert_eq!(producer.sources(), &[EventKind::Orientation]);

        let (tx, _rx) = event_queue(QueuePolicy::Unbounded);
        producer.start(tx).unwrap();
        assert!(matches!(
            producer.add_source(EventKind::Velocity),
            Err(PipelineError::Producer { .. })
        ));
        producer.stop().unwrap();
    }

    #[test]
    fn test_restart_after_stop() {
        let mut producer = PollingProducer::new("idle", IdleSource);
        let (tx, _rx) = event_queue(QueuePolicy::Unbounded);
        producer.start(tx.clone()).unwrap();
        assert!(producer.start(tx).is_err());
        producer.stop().unwrap();

        let (tx, mut rx) = event_queue(QueuePolicy::Unbounded);
        producer.start(tx).unwrap();
        producer.stop().unwrap();
        assert_eq!(drain(&mut rx).len(), 2);
    }
}
