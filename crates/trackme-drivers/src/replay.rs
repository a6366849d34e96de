//! Replay of a recorded `.sns` stream.
//!
//! Records are read back through the resynchronising [`RecordDecoder`], so a
//! file with a damaged region still replays everything around it. Start and
//! Stop records stored in the file are skipped; the producer emits its own.
//! With [`Pacing::Realistic`] samples are released at the recorded timestamp
//! deltas (nanoseconds), otherwise as fast as the queue accepts them.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};
use trackme_core::{Event, EventKind, PipelineError, RecordDecoder, Result};

use crate::common::pacing::Deadline;
use crate::common::Pacing;
use crate::polling::{SampleSource, SourcePoll};

const READ_CHUNK: usize = 4096;

/// Sample source backed by a record file.
#[derive(Debug)]
pub struct ReplaySource {
    path: PathBuf,
    pacing: Pacing,
    reader: Option<BufReader<File>>,
    decoder: RecordDecoder,
    eof: bool,
    pending: Option<Event>,
    first_timestamp: Option<i64>,
    deadline: Option<Deadline>,
}

impl ReplaySource {
    /// Open a record file for replay.
    pub fn open(path: impl AsRef<Path>, pacing: Pacing) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = Self::reader(&path)?;
        Ok(Self {
            path,
            pacing,
            reader: Some(reader),
            decoder: RecordDecoder::new(),
            eof: false,
            pending: None,
            first_timestamp: None,
            deadline: None,
        })
    }

    /// Path of the file being replayed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(path: &Path) -> Result<BufReader<File>> {
        File::open(path).map(BufReader::new).map_err(|e| {
            PipelineError::producer("replay", format!("cannot open {}: {e}", path.display()))
        })
    }

    /// Next data record in file order, or `None` at end of file.
    fn next_data_record(&mut self) -> Result<Option<Event>> {
        loop {
            if let Some(event) = self.decoder.next_event() {
                if event.is_control() {
                    debug!(kind = %event.kind(), "Skipping recorded control record");
                    continue;
                }
                return Ok(Some(event));
            }
            if self.eof {
                return Ok(None);
            }

            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };
            let mut chunk = [0u8; READ_CHUNK];
            let read = reader.read(&mut chunk).map_err(|e| {
                PipelineError::producer(
                    "replay",
                    format!("read from {} failed: {e}", self.path.display()),
                )
            })?;
            if read == 0 {
                self.eof = true;
            } else {
                self.decoder.extend(&chunk[..read]);
            }
        }
    }
}

impl SampleSource for ReplaySource {
    fn enable(&mut self, _kinds: &[EventKind]) -> Result<()> {
        if self.reader.is_none() {
            self.reader = Some(Self::reader(&self.path)?);
        }
        self.decoder = RecordDecoder::new();
        self.eof = false;
        self.pending = None;
        self.first_timestamp = None;
        self.deadline = match self.pacing {
            Pacing::Instant => None,
            Pacing::Realistic => Some(Deadline::starting_now()),
        };
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<SourcePoll> {
        let event = match self.pending.take() {
            Some(event) => event,
            None => match self.next_data_record()? {
                Some(event) => event,
                None => {
                    let skipped = self.decoder.skipped() + self.decoder.pending() as u64;
                    if skipped > 0 {
                        warn!(path = %self.path.display(), skipped, "Replay skipped corrupt bytes");
                    }
                    return Ok(SourcePoll::Exhausted);
                }
            },
        };

        if let Some(deadline) = &self.deadline {
            let first = *self.first_timestamp.get_or_insert(event.timestamp());
            let delta = event.timestamp().saturating_sub(first).max(0);
            let offset = Duration::from_nanos(u64::try_from(delta).unwrap_or(0));
            if !deadline.wait_until(offset, timeout) {
                self.pending = Some(event);
                return Ok(SourcePoll::Idle);
            }
        }

        Ok(SourcePoll::Sample(event))
    }

    fn disable(&mut self) {
        self.reader = None;
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Instant;

    fn write_stream(events: &[Event]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for event in events {
            file.write_all(&event.to_record()).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn collect(source: &mut ReplaySource) -> Vec<Event> {
        source.enable(&[]).unwrap();
        let mut events = Vec::new();
        loop {
            match source.poll(Duration::from_millis(50)).unwrap() {
                SourcePoll::Sample(event) => events.push(event),
                SourcePoll::Idle => {}
                SourcePoll::Exhausted => break,
            }
        }
        source.disable();
        events
    }

    #[test]
    fn test_replay_skips_control_records() {
        let data = [
            Event::new(EventKind::Accelerometer, 10, [1.0, 2.0, 3.0]),
            Event::new(EventKind::Gyroscope, 20, [4.0, 5.0, 6.0]),
        ];
        let file = write_stream(&[Event::start(), data[0], data[1], Event::stop()]);

        let mut source = ReplaySource::open(file.path(), Pacing::Instant).unwrap();
        assert_eq!(collect(&mut source), data.to_vec());

        // A second session replays from the beginning.
        assert_eq!(collect(&mut source), data.to_vec());
    }

    #[test]
    fn test_realistic_pacing_follows_timestamps() {
        let ms = 1_000_000;
        let file = write_stream(&[
            Event::new(EventKind::Accelerometer, 5 * ms, [0.0; 3]),
            Event::new(EventKind::Accelerometer, 45 * ms, [0.0; 3]),
        ]);

        let mut source = ReplaySource::open(file.path(), Pacing::Realistic).unwrap();
        let started = Instant::now();
        let events = collect(&mut source);
        assert_eq!(events.len(), 2);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_missing_file_is_producer_error() {
        let err = ReplaySource::open("/nonexistent/trackme.sns", Pacing::Instant).unwrap_err();
        assert!(matches!(err, PipelineError::Producer { .. }));
    }
}
