//! Sample timestamps.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: u128 = 100;

/// Timestamp of a sensor sample, in 100 ns ticks on the universal time scale.
///
/// Unlike the `f64` seconds used on the wire by most drivers, `Time` is
/// totally ordered, which the merge relies on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(i64);

impl Time {
    pub const MIN: Time = Time(i64::MIN);
    pub const MAX: Time = Time(i64::MAX);

    #[inline]
    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    #[inline]
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Converts seconds to ticks, rounding to the nearest tick.
    #[inline]
    pub fn from_seconds(seconds: f64) -> Self {
        Self((seconds * TICKS_PER_SECOND as f64).round() as i64)
    }

    #[inline]
    pub fn as_seconds(self) -> f64 {
        self.0 as f64 / TICKS_PER_SECOND as f64
    }

    /// Signed difference `self - earlier` in seconds.
    #[inline]
    pub fn seconds_since(self, earlier: Time) -> f64 {
        (self.0 - earlier.0) as f64 / TICKS_PER_SECOND as f64
    }
}

fn duration_to_ticks(duration: Duration) -> i64 {
    (duration.as_nanos() / NANOS_PER_TICK) as i64
}

impl Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Time {
        Time(self.0.saturating_add(duration_to_ticks(rhs)))
    }
}

impl Sub<Duration> for Time {
    type Output = Time;

    fn sub(self, rhs: Duration) -> Time {
        Time(self.0.saturating_sub(duration_to_ticks(rhs)))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.7}s", self.as_seconds())
    }
}
