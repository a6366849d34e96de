//! Sensor and control events.
//!
//! Sensor kinds and the two control kinds share one namespace so that Start
//! and Stop can travel through the same queue as data:
//!
//! ```text
//!   0x00        Unknown
//!   0x01..0x07  sensor kinds      (mask 0x0F)
//!   0x10, 0x20  Start, Stop       (mask 0x70)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ParseError, PipelineError};

/// Kind of an [`Event`], encoded on the wire as its low 8 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EventKind {
    /// Reading from an unrecognised sensor
    Unknown = 0x00,
    /// Acceleration including gravity (m/s^2)
    Accelerometer = 0x01,
    /// Angular velocity (rad/s)
    Gyroscope = 0x02,
    /// Magnetic field (uT)
    MagneticField = 0x03,
    /// Orientation angles
    Orientation = 0x04,
    /// Integrated velocity
    Velocity = 0x05,
    /// Integrated displacement
    Displacement = 0x06,
    /// Acceleration without gravity (m/s^2)
    LinearAcceleration = 0x07,
    /// Stream start sentinel
    Start = 0x10,
    /// Stream stop sentinel
    Stop = 0x20,
}

impl EventKind {
    /// Bits that hold sensor kinds.
    pub const SENSOR_MASK: u8 = 0x0F;

    /// Bits that hold control kinds.
    pub const CONTROL_MASK: u8 = 0x70;

    /// Every sensor kind, in code order.
    pub const SENSORS: [EventKind; 7] = [
        EventKind::Accelerometer,
        EventKind::Gyroscope,
        EventKind::MagneticField,
        EventKind::Orientation,
        EventKind::Velocity,
        EventKind::Displacement,
        EventKind::LinearAcceleration,
    ];

    /// Wire code of this kind.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a kind by its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(EventKind::Unknown),
            0x01 => Some(EventKind::Accelerometer),
            0x02 => Some(EventKind::Gyroscope),
            0x03 => Some(EventKind::MagneticField),
            0x04 => Some(EventKind::Orientation),
            0x05 => Some(EventKind::Velocity),
            0x06 => Some(EventKind::Displacement),
            0x07 => Some(EventKind::LinearAcceleration),
            0x10 => Some(EventKind::Start),
            0x20 => Some(EventKind::Stop),
            _ => None,
        }
    }

    /// Whether this is a lifecycle sentinel (Start or Stop).
    pub fn is_control(self) -> bool {
        self.code() & Self::CONTROL_MASK != 0
    }

    /// Snake-case name used in configuration and logs.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Unknown => "unknown",
            EventKind::Accelerometer => "accelerometer",
            EventKind::Gyroscope => "gyroscope",
            EventKind::MagneticField => "magnetic_field",
            EventKind::Orientation => "orientation",
            EventKind::Velocity => "velocity",
            EventKind::Displacement => "displacement",
            EventKind::LinearAcceleration => "linear_acceleration",
            EventKind::Start => "start",
            EventKind::Stop => "stop",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        [EventKind::Unknown, EventKind::Start, EventKind::Stop]
            .into_iter()
            .chain(EventKind::SENSORS)
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| PipelineError::Configuration(format!("unknown event kind '{s}'")))
    }
}

/// One immutable timestamped sample or control signal.
///
/// Fields are private: an event cannot change after construction. Control
/// events carry a zero timestamp and zero values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    kind: EventKind,
    timestamp: i64,
    values: [f32; 3],
}

impl Event {
    /// Create an event from exactly three values.
    pub fn new(kind: EventKind, timestamp: i64, values: [f32; 3]) -> Self {
        Self {
            kind,
            timestamp,
            values,
        }
    }

    /// Create an event from a value slice.
    ///
    /// Fails unless the slice holds exactly three values; producers pad or
    /// truncate raw readings before calling this.
    pub fn from_slice(kind: EventKind, timestamp: i64, values: &[f32]) -> Result<Self, PipelineError> {
        let values: [f32; 3] = values
            .try_into()
            .map_err(|_| PipelineError::InvalidEvent(values.len()))?;
        Ok(Self::new(kind, timestamp, values))
    }

    /// The Start sentinel.
    pub fn start() -> Self {
        Self::new(EventKind::Start, 0, [0.0; 3])
    }

    /// The Stop sentinel.
    pub fn stop() -> Self {
        Self::new(EventKind::Stop, 0, [0.0; 3])
    }

    /// Event kind.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Producer clock timestamp (monotonic nanoseconds for sensor data).
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The three sample values.
    pub fn values(&self) -> [f32; 3] {
        self.values
    }

    /// Whether this is a Start or Stop sentinel.
    pub fn is_control(&self) -> bool {
        self.kind.is_control()
    }

    /// Whether this is the Stop sentinel.
    pub fn is_stop(&self) -> bool {
        self.kind == EventKind::Stop
    }
}

/// Text form: `kind\ttimestamp\tv0\tv1\tv2`, kind as its numeric code.
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.values;
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.kind.code(),
            self.timestamp,
            x,
            y,
            z
        )
    }
}

impl FromStr for Event {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [kind, timestamp, v0, v1, v2] = tokens[..] else {
            return Err(ParseError::TokenCount {
                found: tokens.len(),
            });
        };

        let code: u8 = parse_field("kind", kind)?;
        let kind = EventKind::from_code(code).ok_or(ParseError::UnknownKind(code))?;
        let timestamp: i64 = parse_field("timestamp", timestamp)?;
        let values = [
            parse_field("v0", v0)?,
            parse_field("v1", v1)?,
            parse_field("v2", v2)?,
        ];

        Ok(Event::new(kind, timestamp, values))
    }
}

fn parse_field<T: FromStr>(field: &'static str, token: &str) -> Result<T, ParseError> {
    token.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        token: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_match_wire_table() {
        assert_eq!(EventKind::Unknown.code(), 0x00);
        assert_eq!(EventKind::Accelerometer.code(), 0x01);
        assert_eq!(EventKind::LinearAcceleration.code(), 0x07);
        assert_eq!(EventKind::Start.code(), 0x10);
        assert_eq!(EventKind::Stop.code(), 0x20);
        for code in 0..=u8::MAX {
            if let Some(kind) = EventKind::from_code(code) {
                assert_eq!(kind.code(), code);
            }
        }
    }

    #[test]
    fn test_control_classification() {
        assert!(EventKind::Start.is_control());
        assert!(EventKind::Stop.is_control());
        assert!(!EventKind::Unknown.is_control());
        for kind in EventKind::SENSORS {
            assert!(!kind.is_control(), "{kind} must be a sensor kind");
            assert_eq!(kind.code() & EventKind::SENSOR_MASK, kind.code());
        }
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in EventKind::SENSORS {
            assert_eq!(kind.name().parse::<EventKind>().unwrap(), kind);
        }
        assert_eq!(
            "Linear-Acceleration".parse::<EventKind>().unwrap(),
            EventKind::LinearAcceleration
        );
        assert!("barometer".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_sentinels_are_zeroed() {
        let start = Event::start();
        assert_eq!(start.kind(), EventKind::Start);
        assert_eq!(start.timestamp(), 0);
        assert_eq!(start.values(), [0.0; 3]);
        assert!(Event::stop().is_stop());
        assert!(Event::stop().is_control());
    }

    #[test]
    fn test_from_slice_requires_three_values() {
        let event = Event::from_slice(EventKind::Gyroscope, 5, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(event.values(), [1.0, 2.0, 3.0]);

        let err = Event::from_slice(EventKind::Gyroscope, 5, &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidEvent(2)));

        let err = Event::from_slice(EventKind::Gyroscope, 5, &[0.0; 6]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidEvent(6)));
    }

    #[test]
    fn test_text_form() {
        let event = Event::new(EventKind::Accelerometer, 1000, [0.1, 0.2, 9.8]);
        assert_eq!(event.to_string(), "1\t1000\t0.1\t0.2\t9.8");
        assert_eq!(Event::stop().to_string(), "32\t0\t0\t0\t0");
    }

    #[test]
    fn test_text_parse_round_trip() {
        let event = Event::new(EventKind::MagneticField, -42, [-12.5, 0.001, 48.25]);
        let parsed: Event = event.to_string().parse().unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_text_parse_accepts_any_whitespace() {
        let parsed: Event = "  2  77\t1.5 2.5\n3.5 ".parse().unwrap();
        assert_eq!(parsed, Event::new(EventKind::Gyroscope, 77, [1.5, 2.5, 3.5]));
    }

    #[test]
    fn test_text_parse_errors() {
        assert_eq!(
            "1\t1000\t0.1\t0.2".parse::<Event>().unwrap_err(),
            ParseError::TokenCount { found: 4 }
        );
        assert_eq!(
            "1 2 3 4 5 6".parse::<Event>().unwrap_err(),
            ParseError::TokenCount { found: 6 }
        );
        assert_eq!(
            "1 abc 0 0 0".parse::<Event>().unwrap_err(),
            ParseError::InvalidNumber {
                field: "timestamp",
                token: "abc".into()
            }
        );
        assert_eq!(
            "1 0 0 x 0".parse::<Event>().unwrap_err(),
            ParseError::InvalidNumber {
                field: "v1",
                token: "x".into()
            }
        );
        assert_eq!(
            "300 0 0 0 0".parse::<Event>().unwrap_err(),
            ParseError::InvalidNumber {
                field: "kind",
                token: "300".into()
            }
        );
        assert_eq!(
            "9 0 0 0 0".parse::<Event>().unwrap_err(),
            ParseError::UnknownKind(9)
        );
    }
}
