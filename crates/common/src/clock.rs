//! Stream clock types.
//!
//! Every stream (video frames, sensor samples) carries its own clock. A
//! [`Timestamp`] is a signed nanosecond count on such a clock; offsets
//! between clocks are expressed as [`chrono::TimeDelta`].

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A point on a stream's clock, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_nanos(ns: i64) -> Self {
        Self(ns)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * NANOS_PER_SEC as f64).round() as i64)
    }

    /// Timestamp of frame `index` in a stream running at `fps`.
    pub fn from_frame_index(index: u64, fps: f64) -> Self {
        Self::from_secs_f64(index as f64 / fps)
    }

    /// Wall-clock instant as nanoseconds since the Unix epoch.
    ///
    /// Returns `None` outside the representable range (roughly years 1677..2262).
    pub fn from_datetime(dt: DateTime<Utc>) -> Option<Self> {
        dt.timestamp_nanos_opt().map(Self)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }

    /// Shift by a signed offset, saturating at the representable range.
    pub fn shifted(self, offset: TimeDelta) -> Self {
        let delta = offset.num_nanoseconds().unwrap_or(if offset < TimeDelta::zero() {
            i64::MIN
        } else {
            i64::MAX
        });
        Self(self.0.saturating_add(delta))
    }

    /// Signed distance `self - earlier`.
    pub fn since(self, earlier: Timestamp) -> TimeDelta {
        TimeDelta::nanoseconds(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Offset in seconds as a nanosecond-resolution `TimeDelta`.
pub fn offset_from_secs(secs: f64) -> TimeDelta {
    TimeDelta::nanoseconds((secs * NANOS_PER_SEC as f64).round() as i64)
}

/// Offset as fractional seconds.
pub fn offset_as_secs(offset: TimeDelta) -> f64 {
    match offset.num_nanoseconds() {
        Some(ns) => ns as f64 / NANOS_PER_SEC as f64,
        None => offset.num_milliseconds() as f64 / 1_000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_round_trip() {
        let ts = Timestamp::from_secs_f64(1.5);
        assert_eq!(ts.as_nanos(), 1_500_000_000);
        assert!((ts.as_secs_f64() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_frame_index_timestamps() {
        assert_eq!(Timestamp::from_frame_index(0, 30.0), Timestamp::ZERO);
        assert_eq!(
            Timestamp::from_frame_index(3, 30.0).as_nanos(),
            100_000_000
        );
    }

    #[test]
    fn test_shift_by_day_round_trip() {
        let ts = Timestamp::from_nanos(42);
        let day = TimeDelta::days(1);
        assert_eq!(ts.shifted(day).shifted(-day), ts);
        assert_eq!(ts.shifted(day).since(ts), day);
    }

    #[test]
    fn test_shift_saturates() {
        let ts = Timestamp::from_nanos(i64::MAX - 1);
        assert_eq!(ts.shifted(TimeDelta::seconds(5)).as_nanos(), i64::MAX);
    }

    #[test]
    fn test_datetime_interop() {
        let dt = DateTime::parse_from_rfc3339("2021-03-04T05:06:07.25Z")
            .unwrap()
            .with_timezone(&Utc);
        let ts = Timestamp::from_datetime(dt).unwrap();
        assert_eq!(ts.to_datetime(), dt);
    }

    #[test]
    fn test_offset_secs_conversions() {
        let offset = offset_from_secs(-2.25);
        assert_eq!(offset, TimeDelta::milliseconds(-2250));
        assert!((offset_as_secs(offset) + 2.25).abs() < 1e-12);
    }
}
