//! Emission pacing for synthetic producers.
//!
//! - **Instant**: no delays, timestamps derived from the sample index; for tests
//! - **Realistic**: samples released at their nominal time, like a real sensor

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How a synthetic source releases its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Zero delays, deterministic
    #[default]
    Instant,
    /// Real-time delays between samples
    Realistic,
}

/// Tracks when the next sample is due in realistic mode.
#[derive(Debug)]
pub(crate) struct Deadline {
    origin: Instant,
}

impl Deadline {
    pub(crate) fn starting_now() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Nanoseconds since the deadline clock started.
    pub(crate) fn elapsed_nanos(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }

    /// Sleep until `offset` after the origin, but for at most `timeout`.
    ///
    /// Returns `true` once the offset has been reached.
    pub(crate) fn wait_until(&self, offset: Duration, timeout: Duration) -> bool {
        let elapsed = self.origin.elapsed();
        if elapsed >= offset {
            return true;
        }
        let remaining = offset - elapsed;
        std::thread::sleep(remaining.min(timeout));
        remaining <= timeout
    }
}
