//! Sensor producers for trackme.
//!
//! Every producer implements [`trackme_core::Producer`] and runs its sampling
//! loop on a dedicated OS thread. The closed set used by the application is
//! [`AnyProducer`]:
//!
//! - [`CallbackProducer`] - readings pushed in by a platform sensor framework
//! - [`PollingProducer`] - a native [`SampleSource`] polled in a loop
//! - [`SyntheticProducer`] - seeded waveforms or a replayed `.sns` file
//!
//! # Example
//!
//! ```rust
//! use trackme_core::{event_queue, EventKind, Producer, QueuePolicy};
//! use trackme_drivers::{AnyProducer, GeneratorConfig, SyntheticProducer};
//!
//! let mut producer = AnyProducer::from(SyntheticProducer::generator(GeneratorConfig {
//!     seed: Some(1),
//!     max_samples: Some(3),
//!     ..GeneratorConfig::default()
//! }));
//! producer.add_source(EventKind::Gyroscope).unwrap();
//!
//! let (tx, mut rx) = event_queue(QueuePolicy::Unbounded);
//! producer.start(tx).unwrap();
//! while let Some(event) = rx.blocking_pop() {
//!     if event.is_stop() {
//!         break;
//!     }
//! }
//! producer.stop().unwrap();
//! ```

pub mod callback;
pub mod common;
pub mod polling;
pub mod replay;
pub mod synthetic;

pub use callback::{kind_for_platform_type, CallbackProducer, RawReading, SensorCallback};
pub use common::{Pacing, SampleRng};
pub use polling::{PollingProducer, SampleSource, SourcePoll, POLL_TIMEOUT};
pub use replay::ReplaySource;
pub use synthetic::{GeneratorConfig, SyntheticProducer, SyntheticSource, WaveformGenerator};

use trackme_core::{EventKind, EventSender, Producer, Result};

/// Native source behind a trait object.
pub type NativeProducer = PollingProducer<Box<dyn SampleSource>>;

/// Every producer the application can run.
#[derive(Debug)]
pub enum AnyProducer {
    /// Hardware-driven, fed by platform callbacks.
    Callback(CallbackProducer),
    /// Native-driven, polling a device source.
    Native(NativeProducer),
    /// Generated or replayed samples.
    Synthetic(SyntheticProducer),
}

impl AnyProducer {
    fn inner(&self) -> &dyn Producer {
        match self {
            AnyProducer::Callback(p) => p,
            AnyProducer::Native(p) => p,
            AnyProducer::Synthetic(p) => p,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Producer {
        match self {
            AnyProducer::Callback(p) => p,
            AnyProducer::Native(p) => p,
            AnyProducer::Synthetic(p) => p,
        }
    }
}

impl Producer for AnyProducer {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn add_source(&mut self, kind: EventKind) -> Result<()> {
        self.inner_mut().add_source(kind)
    }

    fn start(&mut self, queue: EventSender) -> Result<()> {
        self.inner_mut().start(queue)
    }

    fn stop(&mut self) -> Result<()> {
        self.inner_mut().stop()
    }

    fn is_running(&self) -> bool {
        self.inner().is_running()
    }
}

impl From<CallbackProducer> for AnyProducer {
    fn from(producer: CallbackProducer) -> Self {
        AnyProducer::Callback(producer)
    }
}

impl From<NativeProducer> for AnyProducer {
    fn from(producer: NativeProducer) -> Self {
        AnyProducer::Native(producer)
    }
}

impl From<SyntheticProducer> for AnyProducer {
    fn from(producer: SyntheticProducer) -> Self {
        AnyProducer::Synthetic(producer)
    }
}
