//! Hardware-driven producer.
//!
//! Platform sensor frameworks deliver readings by calling back into the
//! application from their own thread. [`CallbackProducer`] hands out a
//! clonable [`SensorCallback`] for that purpose; readings travel over a
//! channel to a listener thread owned by the producer, which maps the platform
//! sensor type to an [`EventKind`], normalises the values to three components
//! and pushes the event.
//!
//! ```text
//!   platform thread ─► SensorCallback::deliver ─► channel ─► listener thread ─► queue
//! ```
//!
//! The callback side never blocks, so a slow consumer cannot stall the
//! platform's sensor thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use trackme_core::{Event, EventKind, EventSender, PipelineError, Producer, Result, SentinelGuard};

use crate::common::worker::Worker;

/// Platform sensor type codes (Android `Sensor.TYPE_*`).
pub mod platform {
    /// Accelerometer
    pub const TYPE_ACCELEROMETER: i32 = 1;
    /// Magnetic field
    pub const TYPE_MAGNETIC_FIELD: i32 = 2;
    /// Gyroscope
    pub const TYPE_GYROSCOPE: i32 = 4;
    /// Linear acceleration
    pub const TYPE_LINEAR_ACCELERATION: i32 = 10;
    /// Uncalibrated magnetic field
    pub const TYPE_MAGNETIC_FIELD_UNCALIBRATED: i32 = 14;
    /// Uncalibrated gyroscope
    pub const TYPE_GYROSCOPE_UNCALIBRATED: i32 = 16;
}

/// Map a platform sensor type to an event kind.
pub fn kind_for_platform_type(sensor_type: i32) -> EventKind {
    match sensor_type {
        platform::TYPE_ACCELEROMETER => EventKind::Accelerometer,
        platform::TYPE_MAGNETIC_FIELD | platform::TYPE_MAGNETIC_FIELD_UNCALIBRATED => {
            EventKind::MagneticField
        }
        platform::TYPE_GYROSCOPE | platform::TYPE_GYROSCOPE_UNCALIBRATED => EventKind::Gyroscope,
        platform::TYPE_LINEAR_ACCELERATION => EventKind::LinearAcceleration,
        _ => EventKind::Unknown,
    }
}

/// Pad with zeros or truncate a raw reading to three values.
pub fn normalize_values(raw: &[f32]) -> [f32; 3] {
    let mut values = [0.0; 3];
    for (slot, value) in values.iter_mut().zip(raw) {
        *slot = *value;
    }
    values
}

/// One raw reading as delivered by the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    /// Platform sensor type code
    pub sensor_type: i32,
    /// Platform timestamp (ns)
    pub timestamp: i64,
    /// Raw values, any length
    pub values: Vec<f32>,
}

#[derive(Debug)]
enum Signal {
    Reading(RawReading),
    Shutdown,
}

/// Handle the platform calls with each reading.
///
/// Cheap to clone. Readings delivered while the producer is not running are
/// discarded.
#[derive(Debug, Clone)]
pub struct SensorCallback {
    tx: mpsc::UnboundedSender<Signal>,
    active: Arc<AtomicBool>,
}

impl SensorCallback {
    /// Deliver one reading. Returns `false` if it was discarded.
    pub fn deliver(&self, sensor_type: i32, timestamp: i64, values: &[f32]) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }
        let reading = RawReading {
            sensor_type,
            timestamp,
            values: values.to_vec(),
        };
        self.tx.send(Signal::Reading(reading)).is_ok()
    }
}

/// Producer fed by platform callbacks.
#[derive(Debug)]
pub struct CallbackProducer {
    name: String,
    sources: Vec<EventKind>,
    callback: SensorCallback,
    rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<Signal>>>>,
    worker: Worker<()>,
}

impl CallbackProducer {
    /// Create a producer with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            sources: Vec::new(),
            callback: SensorCallback {
                tx,
                active: Arc::new(AtomicBool::new(false)),
            },
            rx: Arc::new(Mutex::new(Some(rx))),
            worker: Worker::new(),
        }
    }

    /// Handle to register with the platform sensor framework.
    pub fn callback(&self) -> SensorCallback {
        self.callback.clone()
    }

    /// Declared sensor kinds.
    pub fn sources(&self) -> &[EventKind] {
        &self.sources
    }
}

impl Producer for CallbackProducer {
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
        if self.worker.is_spawned() {
            return Err(PipelineError::producer(&self.name, "already started"));
        }

        let name = self.name.clone();
        let sources = self.sources.clone();
        let slot = Arc::clone(&self.rx);
        let active = Arc::clone(&self.callback.active);

        self.worker.spawn(&self.name, move |running| {
            let mut guard_rx = slot.lock();
            let Some(rx) = guard_rx.as_mut() else {
                warn!(producer = %name, "Reading channel unavailable");
                return;
            };

            // Readings queued while idle belong to no session.
            while rx.try_recv().is_ok() {}

            let mut guard = match SentinelGuard::open(&name, queue) {
                Ok(guard) => guard,
                Err(e) => {
                    warn!(producer = %name, error = %e, "Failed to open stream");
                    return;
                }
            };
            active.store(true, Ordering::SeqCst);
            info!(producer = %name, sources = ?sources, "Listening for sensor callbacks");

            while running.load(Ordering::SeqCst) {
                let reading = match rx.blocking_recv() {
                    Some(Signal::Reading(reading)) => reading,
                    Some(Signal::Shutdown) | None => break,
                };

                let kind = kind_for_platform_type(reading.sensor_type);
                if !sources.is_empty() && !sources.contains(&kind) {
                    trace!(producer = %name, sensor_type = reading.sensor_type, "Undeclared sensor");
                    continue;
                }
                let event = Event::new(kind, reading.timestamp, normalize_values(&reading.values));
                match guard.push(event) {
                    Ok(()) => {}
                    Err(PipelineError::QueueClosed) => {
                        warn!(producer = %name, "Consumer gone, stopping listener");
                        break;
                    }
                    Err(e) => warn!(producer = %name, error = %e, "Dropped reading"),
                }
            }

            active.store(false, Ordering::SeqCst);
            let events = guard.data_events();
            if let Err(e) = guard.finish() {
                warn!(producer = %name, error = %e, "Failed to push Stop");
            }
            info!(producer = %name, events, "Listener stopped");
        })
    }

    fn stop(&mut self) -> Result<()> {
        if !self.worker.is_spawned() {
            return Ok(());
        }
        self.worker.signal_stop();
        self.callback.active.store(false, Ordering::SeqCst);
        // Wakes the listener if it is parked in blocking_recv.
        if self.callback.tx.send(Signal::Shutdown).is_err() {
            debug!(producer = %self.name, "Listener channel already closed");
        }
        self.worker.join(&self.name);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}

impl Drop for CallbackProducer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(producer = %self.name, error = %e, "Failed to stop on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use trackme_core::{event_queue, QueuePolicy};

    fn wait_until_active(callback: &SensorCallback) {
        for _ in 0..200 {
            if callback.active.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("listener never became active");
    }

    #[test]
    fn test_platform_type_table() {
        assert_eq!(kind_for_platform_type(1), EventKind::Accelerometer);
        assert_eq!(kind_for_platform_type(2), EventKind::MagneticField);
        assert_eq!(kind_for_platform_type(14), EventKind::MagneticField);
        assert_eq!(kind_for_platform_type(4), EventKind::Gyroscope);
        assert_eq!(kind_for_platform_type(16), EventKind::Gyroscope);
        assert_eq!(kind_for_platform_type(10), EventKind::LinearAcceleration);
        assert_eq!(kind_for_platform_type(3), EventKind::Unknown);
        assert_eq!(kind_for_platform_type(-1), EventKind::Unknown);
    }

    #[test]
    fn test_normalize_values() {
        assert_eq!(normalize_values(&[1.0]), [1.0, 0.0, 0.0]);
        assert_eq!(normalize_values(&[1.0, 2.0, 3.0, 4.0, 5.0]), [1.0, 2.0, 3.0]);
        assert_eq!(normalize_values(&[]), [0.0; 3]);
    }

    #[test]
    fn test_callback_readings_become_events() {
        let mut producer = CallbackProducer::new("android");
        producer.add_source(EventKind::Accelerometer).unwrap();
        producer.add_source(EventKind::Gyroscope).unwrap();
        let callback = producer.callback();

        // Discarded: producer not started yet.
        assert!(!callback.deliver(1, 1, &[0.0; 3]));

        let (tx, mut rx) = event_queue(QueuePolicy::Unbounded);
        producer.start(tx).unwrap();
        wait_until_active(&callback);

        let platform = std::thread::spawn(move || {
            assert!(callback.deliver(1, 100, &[0.1, 0.2, 9.8]));
            assert!(callback.deliver(2, 150, &[30.0, 0.0, -40.0]));
            assert!(callback.deliver(4, 200, &[0.5, 0.25, 0.125, 99.0]));
        });
        platform.join().unwrap();

        assert_eq!(rx.blocking_pop(), Some(Event::start()));
        assert_eq!(
            rx.blocking_pop(),
            Some(Event::new(EventKind::Accelerometer, 100, [0.1, 0.2, 9.8]))
        );
        // Magnetic field was not declared and is filtered out.
        assert_eq!(
            rx.blocking_pop(),
            Some(Event::new(EventKind::Gyroscope, 200, [0.5, 0.25, 0.125]))
        );

        producer.stop().unwrap();
        assert_eq!(rx.blocking_pop(), Some(Event::stop()));
        assert!(!producer.is_running());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut producer = CallbackProducer::new("android");
        producer.stop().unwrap();

        let (tx, mut rx) = event_queue(QueuePolicy::Unbounded);
        producer.start(tx).unwrap();
        producer.stop().unwrap();
        producer.stop().unwrap();

        let kinds: Vec<_> = std::iter::from_fn(|| rx.blocking_pop())
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds, vec![EventKind::Start, EventKind::Stop]);
    }

    #[test]
    fn test_add_source_after_start_fails() {
        let mut producer = CallbackProducer::new("android");
        let (tx, _rx) = event_queue(QueuePolicy::Unbounded);
        producer.start(tx).unwrap();
        assert!(producer.add_source(EventKind::Accelerometer).is_err());
        producer.stop().unwrap();
    }
}
