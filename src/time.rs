//! Monotonic time types used throughout the transport core.
//!
//! The core never reads the wall clock itself; callers stamp every public
//! entry point with an [`Instant`] (typically derived from
//! `std::time::Instant::now()`), which keeps the state machine testable
//! without a real clock or sleeping.

use core::fmt;
use core::ops::{Add, Sub};

/// A point in monotonic time, expressed in milliseconds since an arbitrary
/// epoch fixed at the owning [`crate::Endpoint`]'s creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(i64);

impl Instant {
    pub const ZERO: Instant = Instant(0);

    pub const fn from_millis(millis: i64) -> Instant {
        Instant(millis)
    }

    pub const fn from_secs(secs: i64) -> Instant {
        Instant(secs * 1000)
    }

    pub const fn total_millis(&self) -> i64 {
        self.0
    }

    /// Saturating duration since an earlier instant; clamps to zero if
    /// `earlier` is actually later (can happen with a misbehaving external
    /// clock source).
    pub fn saturating_duration_since(&self, earlier: Instant) -> Duration {
        Duration::from_millis((self.0 - earlier.0).max(0) as u64)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;
    fn add(self, rhs: Duration) -> Instant {
        Instant(self.0 + rhs.0 as i64)
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;
    fn sub(self, rhs: Duration) -> Instant {
        Instant(self.0 - rhs.0 as i64)
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;
    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_millis((self.0 - rhs.0).max(0) as u64)
    }
}

/// A span of time, in milliseconds. Kept separate from [`Instant`] so that
/// "now - then" arithmetic can't silently be mistaken for a timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(u64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    pub const fn from_millis(millis: u64) -> Duration {
        Duration(millis)
    }

    pub const fn from_secs(secs: u64) -> Duration {
        Duration(secs * 1000)
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_since_clamps_to_zero() {
        let earlier = Instant::from_millis(100);
        let later = Instant::from_millis(40);
        assert_eq!(later.saturating_duration_since(earlier), Duration::ZERO);
    }

    #[test]
    fn add_and_sub_round_trip() {
        let t = Instant::from_millis(1000);
        let d = Duration::from_millis(250);
        assert_eq!((t + d) - d, t);
    }
}
