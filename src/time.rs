/// Virtual time for the flood simulation.
///
/// A timestamp on the simulation's own clock, with no dependency on
/// `std::time`. Time advances only when the scheduler processes events,
/// never from wall-clock observation.
///
/// Values are whole nanoseconds. Configuration speaks in fractional
/// seconds, so conversions round to the nearest nanosecond.

use serde::{Deserialize, Serialize};

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A point (or span) on the simulation clock, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// Largest representable time.
    pub const MAX: VirtualTime = VirtualTime(u64::MAX);

    /// Create a `VirtualTime` from raw nanoseconds.
    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        VirtualTime(nanos)
    }

    /// Create a `VirtualTime` from milliseconds.
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        VirtualTime(millis * 1_000_000)
    }

    /// Create a `VirtualTime` from whole seconds.
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        VirtualTime(secs * NANOS_PER_SEC)
    }

    /// Create a `VirtualTime` from fractional seconds.
    ///
    /// Returns `None` for negative, NaN, infinite, or out-of-range input.
    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        let nanos = (secs * NANOS_PER_SEC as f64).round();
        if nanos > u64::MAX as f64 {
            return None;
        }
        Some(VirtualTime(nanos as u64))
    }

    /// Create a `VirtualTime` from a `std::time::Duration` span.
    pub fn from_duration(d: std::time::Duration) -> Option<Self> {
        u64::try_from(d.as_nanos()).ok().map(VirtualTime)
    }

    /// Return the raw nanosecond value.
    #[inline]
    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// Return the value as fractional seconds.
    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// Advance time by `delta`.
    /// Returns `None` on overflow.
    #[inline]
    pub fn checked_add(self, delta: VirtualTime) -> Option<VirtualTime> {
        self.0.checked_add(delta.0).map(VirtualTime)
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: VirtualTime) -> bool {
        self.0 < other.0
    }

    /// Returns the span between two points in time.
    /// Returns `None` if `earlier` is after `self`.
    #[inline]
    pub fn duration_since(self, earlier: VirtualTime) -> Option<VirtualTime> {
        self.0.checked_sub(earlier.0).map(VirtualTime)
    }
}

impl std::fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.0 / NANOS_PER_SEC;
        let nanos = self.0 % NANOS_PER_SEC;
        write!(f, "T={}.{:09}s", secs, nanos)
    }
}
