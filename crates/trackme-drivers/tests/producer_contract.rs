//! Stream contract checks across every producer variant.

use std::io::Write;
use std::time::Duration;

use trackme_core::{event_queue, Event, EventKind, Producer, QueuePolicy, Result};
use trackme_drivers::{
    AnyProducer, CallbackProducer, GeneratorConfig, NativeProducer, Pacing, PollingProducer,
    SampleSource, SourcePoll, SyntheticProducer,
};

/// Run a producer to completion (or for `run_for`) and return what it pushed.
fn record(mut producer: AnyProducer, run_for: Option<Duration>) -> Vec<Event> {
    let (tx, mut rx) = event_queue(QueuePolicy::Bounded { capacity: 8 });
    producer.start(tx).unwrap();

    let reader = std::thread::spawn(move || std::iter::from_fn(|| rx.blocking_pop()).collect::<Vec<_>>());
    match run_for {
        Some(duration) => std::thread::sleep(duration),
        None => {
            while producer.is_running() {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }
    producer.stop().unwrap();
    drop(producer);
    reader.join().unwrap()
}

fn assert_contract(events: &[Event]) {
    assert_eq!(events.first().map(Event::kind), Some(EventKind::Start));
    assert_eq!(events.last().map(Event::kind), Some(EventKind::Stop));
    let controls = events.iter().filter(|e| e.is_control()).count();
    assert_eq!(controls, 2, "exactly one Start and one Stop");
}

#[derive(Debug)]
struct CountingSource {
    remaining: u32,
}

impl SampleSource for CountingSource {
    fn enable(&mut self, _kinds: &[EventKind]) -> Result<()> {
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> Result<SourcePoll> {
        if self.remaining == 0 {
            return Ok(SourcePoll::Exhausted);
        }
        self.remaining -= 1;
        Ok(SourcePoll::Sample(Event::new(
            EventKind::Velocity,
            i64::from(self.remaining),
            [1.0, 2.0, 3.0],
        )))
    }

    fn disable(&mut self) {}
}

#[test]
fn test_synthetic_generator_contract() {
    let mut producer = SyntheticProducer::generator(GeneratorConfig {
        seed: Some(3),
        max_samples: Some(50),
        ..GeneratorConfig::default()
    });
    producer.add_source(EventKind::Accelerometer).unwrap();
    producer.add_source(EventKind::MagneticField).unwrap();

    let events = record(producer.into(), None);
    assert_contract(&events);
    assert_eq!(events.len(), 52);
}

#[test]
fn test_native_source_contract() {
    let source: Box<dyn SampleSource> = Box::new(CountingSource { remaining: 20 });
    let producer: NativeProducer = PollingProducer::new("native", source);

    let events = record(producer.into(), None);
    assert_contract(&events);
    assert_eq!(events.len(), 22);
}

#[test]
fn test_realistic_generator_stopped_early() {
    let mut producer = SyntheticProducer::generator(GeneratorConfig {
        seed: Some(9),
        rate_hz: 200.0,
        pacing: Pacing::Realistic,
        ..GeneratorConfig::default()
    });
    producer.add_source(EventKind::Gyroscope).unwrap();

    let events = record(producer.into(), Some(Duration::from_millis(100)));
    assert_contract(&events);
    assert!(events.len() > 2);

    let data: Vec<_> = events.iter().filter(|e| !e.is_control()).collect();
    assert!(data.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
}

#[test]
fn test_callback_producer_without_readings() {
    let producer = CallbackProducer::new("platform");
    let events = record(producer.into(), Some(Duration::from_millis(20)));
    assert_eq!(
        events.iter().map(Event::kind).collect::<Vec<_>>(),
        vec![EventKind::Start, EventKind::Stop]
    );
}

#[test]
fn test_replay_reproduces_recorded_data() {
    let recorded = [
        Event::new(EventKind::Accelerometer, 1_000, [0.1, 0.2, 9.8]),
        Event::new(EventKind::Gyroscope, 2_000, [0.0, 0.5, -0.5]),
        Event::new(EventKind::LinearAcceleration, 3_000, [1.0, 0.0, 0.0]),
    ];
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&Event::start().to_record()).unwrap();
    for event in &recorded {
        file.write_all(&event.to_record()).unwrap();
    }
    file.write_all(&Event::stop().to_record()).unwrap();
    file.flush().unwrap();

    let producer = SyntheticProducer::replay(file.path(), Pacing::Instant).unwrap();
    let events = record(producer.into(), None);
    assert_contract(&events);
    assert_eq!(&events[1..4], &recorded);
}

#[test]
fn test_replay_without_sources_keeps_unknown_records() {
    let recorded = [
        Event::new(EventKind::Unknown, 1, [0.0, 0.0, 0.0]),
        Event::new(EventKind::Accelerometer, 2, [0.1, 0.2, 9.8]),
    ];
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&Event::start().to_record()).unwrap();
    for event in &recorded {
        file.write_all(&event.to_record()).unwrap();
    }
    file.write_all(&Event::stop().to_record()).unwrap();
    file.flush().unwrap();

    let producer = SyntheticProducer::replay(file.path(), Pacing::Instant).unwrap();
    assert!(producer.sources().is_empty());
    let events = record(producer.into(), None);
    assert_eq!(
        events.iter().map(Event::kind).collect::<Vec<_>>(),
        vec![
            EventKind::Start,
            EventKind::Unknown,
            EventKind::Accelerometer,
            EventKind::Stop
        ]
    );
    assert_eq!(&events[1..3], &recorded);
}
