//! Binary record codec.
//!
//! Every [`Event`] is written as one fixed 25-byte big-endian record:
//!
//! ```text
//!  offset  size  field
//!  0       4     magic 0x56289740
//!  4       1     kind code
//!  5       8     timestamp (i64)
//!  13      4     values[0] (f32)
//!  17      4     values[1] (f32)
//!  21      4     values[2] (f32)
//! ```
//!
//! The file sink and the network sink emit exactly the same bytes. Readers
//! that start mid-stream or meet corrupted bytes use [`RecordDecoder`], which
//! scans forward for the magic value to find the next record boundary.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::DecodeError;
use crate::event::{Event, EventKind};

/// Marker at the start of every record.
pub const MAGIC: u32 = 0x5628_9740;

/// Size of one encoded record in bytes.
pub const RECORD_SIZE: usize = 25;

const MAGIC_BYTES: [u8; 4] = MAGIC.to_be_bytes();

/// Encode an event into its 25-byte record.
pub fn encode(event: &Event) -> [u8; RECORD_SIZE] {
    let mut record = [0u8; RECORD_SIZE];
    let mut buf = &mut record[..];
    buf.put_u32(MAGIC);
    buf.put_u8(event.kind().code());
    buf.put_i64(event.timestamp());
    for value in event.values() {
        buf.put_f32(value);
    }
    record
}

/// Decode one record.
///
/// The slice must be exactly [`RECORD_SIZE`] bytes long.
pub fn decode(record: &[u8]) -> Result<Event, DecodeError> {
    if record.len() != RECORD_SIZE {
        return Err(DecodeError::Length {
            expected: RECORD_SIZE,
            actual: record.len(),
        });
    }

    let mut buf = record;
    let magic = buf.get_u32();
    if magic != MAGIC {
        return Err(DecodeError::Magic(magic));
    }
    let code = buf.get_u8();
    let kind = EventKind::from_code(code).ok_or(DecodeError::UnknownKind(code))?;
    let timestamp = buf.get_i64();
    let values = [buf.get_f32(), buf.get_f32(), buf.get_f32()];

    Ok(Event::new(kind, timestamp, values))
}

impl Event {
    /// Encode this event into its 25-byte record.
    pub fn to_record(&self) -> [u8; RECORD_SIZE] {
        encode(self)
    }
}

/// Incremental decoder for a stream of records.
///
/// Feed it arbitrary chunks with [`extend`](Self::extend) and drain complete
/// events with [`next_event`](Self::next_event). Bytes that do not belong to a
/// valid record are skipped up to the next magic value and counted in
/// [`skipped`](Self::skipped).
#[derive(Debug, Default)]
pub struct RecordDecoder {
    buf: BytesMut,
    skipped: u64,
}

impl RecordDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Total number of bytes discarded while resynchronising.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Bytes held back as an incomplete record.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Return the next complete event, or `None` if more bytes are needed.
    pub fn next_event(&mut self) -> Option<Event> {
        loop {
            self.align();
            if self.buf.len() < RECORD_SIZE {
                return None;
            }

            match decode(&self.buf[..RECORD_SIZE]) {
                Ok(event) => {
                    self.buf.advance(RECORD_SIZE);
                    return Some(event);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Dropping corrupt record, resynchronising");
                    self.discard(1);
                }
            }
        }
    }

    /// Drop leading bytes until the buffer starts with the magic value.
    ///
    /// Up to three trailing bytes are kept when no magic is found, since they
    /// may be the beginning of one split across chunks.
    fn align(&mut self) {
        if self.buf.len() < MAGIC_BYTES.len() || self.buf.starts_with(&MAGIC_BYTES) {
            return;
        }

        let skip = match self
            .buf
            .windows(MAGIC_BYTES.len())
            .position(|window| window == MAGIC_BYTES)
        {
            Some(offset) => offset,
            None => self.buf.len() - (MAGIC_BYTES.len() - 1),
        };
        if skip > 0 {
            tracing::warn!(skipped = skip, "Record stream out of sync, scanning for magic");
            self.discard(skip);
        }
    }

    fn discard(&mut self, count: usize) {
        self.buf.advance(count);
        self.skipped += count as u64;
    }
}

/// Decode a buffer holding back-to-back records.
///
/// Returns the events found and the number of bytes skipped while
/// resynchronising. A trailing partial record is counted as skipped.
pub fn decode_all(bytes: &[u8]) -> (Vec<Event>, u64) {
    let mut decoder = RecordDecoder::new();
    decoder.extend(bytes);
    let events = std::iter::from_fn(|| decoder.next_event()).collect();
    (events, decoder.skipped() + decoder.pending() as u64)
}
