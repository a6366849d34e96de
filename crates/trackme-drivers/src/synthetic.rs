//! Synthetic producer for tests and demos.
//!
//! Two kinds of source are available behind one producer type:
//!
//! - **Generated**: seeded waveforms per declared sensor kind at a fixed rate,
//!   optionally limited to a number of samples
//! - **Replay**: a recorded `.sns` file (see [`crate::replay`])
//!
//! # Example
//!
//! ```rust
//! use trackme_core::{event_queue, EventKind, Producer, QueuePolicy};
//! use trackme_drivers::{GeneratorConfig, SyntheticProducer};
//!
//! let mut producer = SyntheticProducer::generator(GeneratorConfig {
//!     seed: Some(7),
//!     max_samples: Some(4),
//!     ..GeneratorConfig::default()
//! });
//! producer.add_source(EventKind::Accelerometer).unwrap();
//!
//! let (tx, mut rx) = event_queue(QueuePolicy::Unbounded);
//! producer.start(tx).unwrap();
//! let events: Vec<_> = std::iter::from_fn(|| rx.blocking_pop()).collect();
//! producer.stop().unwrap();
//!
//! assert_eq!(events.len(), 6); // Start, 4 samples, Stop
//! ```

use std::f32::consts::TAU;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use trackme_core::{Event, EventKind, PipelineError, Result};

use crate::common::pacing::Deadline;
use crate::common::{Pacing, SampleRng};
use crate::polling::{PollingProducer, SampleSource, SourcePoll};
use crate::replay::ReplaySource;

/// Standard gravity (m/s^2).
const GRAVITY: f32 = 9.806_65;

/// Settings for the waveform generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// RNG seed; `None` seeds from the OS
    #[serde(default)]
    pub seed: Option<u64>,
    /// Samples per second for each sensor kind
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
    /// Total number of samples before the source runs dry
    #[serde(default)]
    pub max_samples: Option<u64>,
    /// Instant or real-time emission
    #[serde(default)]
    pub pacing: Pacing,
    /// Amplitude of the uniform noise added to every value
    #[serde(default = "default_noise")]
    pub noise: f32,
}

fn default_rate_hz() -> f64 {
    100.0
}

fn default_noise() -> f32 {
    0.02
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: None,
            rate_hz: default_rate_hz(),
            max_samples: None,
            pacing: Pacing::default(),
            noise: default_noise(),
        }
    }
}

/// Seeded waveform source.
///
/// Each tick produces one sample per enabled kind, round-robin, so the output
/// interleaves kinds the way a multi-sensor device does.
#[derive(Debug)]
pub struct WaveformGenerator {
    config: GeneratorConfig,
    rng: SampleRng,
    kinds: Vec<EventKind>,
    tick: u64,
    slot: usize,
    emitted: u64,
    deadline: Option<Deadline>,
    period: Duration,
}

impl GeneratorConfig {
    /// Interval between ticks, or `None` when `rate_hz` does not give a
    /// representable, non-zero period.
    pub fn period(&self) -> Option<Duration> {
        if !(self.rate_hz.is_finite() && self.rate_hz > 0.0) {
            return None;
        }
        Duration::try_from_secs_f64(self.rate_hz.recip())
            .ok()
            .filter(|period| !period.is_zero())
    }
}

impl WaveformGenerator {
    /// Create a generator; kinds are supplied on `enable`.
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            rng: SampleRng::new(config.seed),
            config,
            kinds: Vec::new(),
            tick: 0,
            slot: 0,
            emitted: 0,
            deadline: None,
            period: Duration::ZERO,
        }
    }

    fn values(&mut self, kind: EventKind, t: f32) -> [f32; 3] {
        let base = match kind {
            EventKind::Accelerometer => [0.0, 0.0, GRAVITY],
            EventKind::LinearAcceleration => {
                [0.5 * (TAU * 0.5 * t).sin(), 0.5 * (TAU * 0.5 * t).cos(), 0.0]
            }
            EventKind::Gyroscope => [
                0.2 * (TAU * 0.25 * t).sin(),
                0.1 * (TAU * 0.25 * t).cos(),
                0.05 * (TAU * 0.1 * t).sin(),
            ],
            EventKind::MagneticField => [22.0, 5.0, -42.0],
            EventKind::Orientation => [(36.0 * t) % 360.0, 0.0, 0.0],
            EventKind::Velocity => [(TAU * 0.2 * t).cos(), 0.0, 0.0],
            EventKind::Displacement => [(TAU * 0.2 * t).sin() / (TAU * 0.2), 0.0, 0.0],
            EventKind::Unknown | EventKind::Start | EventKind::Stop => [0.0; 3],
        };
        let noise = self.config.noise;
        base.map(|v| v + self.rng.noise(noise))
    }
}

impl SampleSource for WaveformGenerator {
    fn enable(&mut self, kinds: &[EventKind]) -> Result<()> {
        self.period = self.config.period().ok_or_else(|| {
            PipelineError::producer(
                "synthetic",
                format!("rate_hz {} does not give a usable sample period", self.config.rate_hz),
            )
        })?;
        self.kinds = kinds.iter().copied().filter(|k| !k.is_control()).collect();
        self.tick = 0;
        self.slot = 0;
        self.emitted = 0;
        self.deadline = match self.config.pacing {
            Pacing::Instant => None,
            Pacing::Realistic => Some(Deadline::starting_now()),
        };
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<SourcePoll> {
        if self.kinds.is_empty() || self.config.max_samples.is_some_and(|max| self.emitted >= max) {
            return Ok(SourcePoll::Exhausted);
        }

        let offset = self.period.saturating_mul(u32::try_from(self.tick).unwrap_or(u32::MAX));
        let timestamp = match &self.deadline {
            Some(deadline) => {
                if !deadline.wait_until(offset, timeout) {
                    return Ok(SourcePoll::Idle);
                }
                deadline.elapsed_nanos()
            }
            None => i64::try_from(offset.as_nanos()).unwrap_or(i64::MAX),
        };

        let kind = self.kinds[self.slot];
        let values = self.values(kind, offset.as_secs_f32());

        self.slot += 1;
        if self.slot == self.kinds.len() {
            self.slot = 0;
            self.tick += 1;
        }
        self.emitted += 1;

        Ok(SourcePoll::Sample(Event::new(kind, timestamp, values)))
    }

    fn disable(&mut self) {
        self.deadline = None;
    }
}

/// Source behind [`SyntheticProducer`].
#[derive(Debug)]
pub enum SyntheticSource {
    /// Seeded waveforms.
    Generated(WaveformGenerator),
    /// Recorded file.
    Replay(ReplaySource),
}

impl SampleSource for SyntheticSource {
    fn enable(&mut self, kinds: &[EventKind]) -> Result<()> {
        match self {
            SyntheticSource::Generated(source) => source.enable(kinds),
            SyntheticSource::Replay(source) => source.enable(kinds),
        }
    }

    fn poll(&mut self, timeout: Duration) -> Result<SourcePoll> {
        match self {
            SyntheticSource::Generated(source) => source.poll(timeout),
            SyntheticSource::Replay(source) => source.poll(timeout),
        }
    }

    fn disable(&mut self) {
        match self {
            SyntheticSource::Generated(source) => source.disable(),
            SyntheticSource::Replay(source) => source.disable(),
        }
    }
}

/// Producer over generated or replayed samples.
pub type SyntheticProducer = PollingProducer<SyntheticSource>;

impl PollingProducer<SyntheticSource> {
    /// Producer emitting seeded waveforms.
    pub fn generator(config: GeneratorConfig) -> Self {
        PollingProducer::new(
            "synthetic",
            SyntheticSource::Generated(WaveformGenerator::new(config)),
        )
    }

    /// Producer replaying a recorded file.
    pub fn replay(path: impl AsRef<Path>, pacing: Pacing) -> Result<Self> {
        let source = ReplaySource::open(path, pacing)?;
        Ok(PollingProducer::new("replay", SyntheticSource::Replay(source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(generator: &mut WaveformGenerator, kinds: &[EventKind]) -> Vec<Event> {
        generator.enable(kinds).unwrap();
        let mut events = Vec::new();
        while let SourcePoll::Sample(event) = generator.poll(Duration::from_millis(10)).unwrap() {
            events.push(event);
        }
        events
    }

    fn seeded(max_samples: u64) -> GeneratorConfig {
        GeneratorConfig {
            seed: Some(42),
            max_samples: Some(max_samples),
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn test_round_robin_over_kinds() {
        let mut generator = WaveformGenerator::new(seeded(6));
        let events = run(
            &mut generator,
            &[EventKind::Accelerometer, EventKind::Gyroscope],
        );

        let kinds: Vec<_> = events.iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            [EventKind::Accelerometer, EventKind::Gyroscope].repeat(3)
        );
        // 100 Hz: ticks are 10 ms apart.
        let stamps: Vec<_> = events.iter().map(Event::timestamp).collect();
        assert_eq!(stamps, vec![0, 0, 10_000_000, 10_000_000, 20_000_000, 20_000_000]);
    }

    #[test]
    fn test_accelerometer_sees_gravity() {
        let mut generator = WaveformGenerator::new(seeded(20));
        for event in run(&mut generator, &[EventKind::Accelerometer]) {
            let [x, y, z] = event.values();
            assert!(x.abs() < 0.05 && y.abs() < 0.05);
            assert!((z - GRAVITY).abs() < 0.05);
        }
    }

    #[test]
    fn test_same_seed_same_samples() {
        let kinds = [EventKind::MagneticField];
        let a = run(&mut WaveformGenerator::new(seeded(10)), &kinds);
        let b = run(&mut WaveformGenerator::new(seeded(10)), &kinds);
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let mut generator = WaveformGenerator::new(GeneratorConfig {
            rate_hz: 0.0,
            ..GeneratorConfig::default()
        });
        assert!(generator.enable(&[EventKind::Accelerometer]).is_err());
    }

    #[test]
    fn test_unrepresentable_rate_rejected() {
        for rate_hz in [1e-300, 1e300, f64::NAN, -5.0] {
            let config = GeneratorConfig {
                rate_hz,
                max_samples: Some(3),
                ..GeneratorConfig::default()
            };
            assert_eq!(config.period(), None, "rate {rate_hz}");
            let mut generator = WaveformGenerator::new(config);
            assert!(matches!(
                generator.enable(&[EventKind::Accelerometer]),
                Err(PipelineError::Producer { .. })
            ));
        }
        let period = GeneratorConfig::default().period().unwrap();
        assert!(period.as_nanos().abs_diff(10_000_000) <= 1);
    }

    #[test]
    fn test_realistic_pacing_waits() {
        let mut generator = WaveformGenerator::new(GeneratorConfig {
            rate_hz: 10.0,
            pacing: Pacing::Realistic,
            ..seeded(2)
        });
        generator.enable(&[EventKind::Gyroscope]).unwrap();
        assert!(matches!(
            generator.poll(Duration::from_millis(1)).unwrap(),
            SourcePoll::Sample(_)
        ));
        // Next sample is due 100 ms in; a 1 ms poll comes back empty.
        assert_eq!(
            generator.poll(Duration::from_millis(1)).unwrap(),
            SourcePoll::Idle
        );
    }
}
