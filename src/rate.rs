//! Link and generator data rates.
//!
//! Rates are written the way network simulators usually write them:
//! `"10Mbps"`, `"1Mbps"`, `"512kbps"`, `"1Gbps"`, `"9600bps"`. Decimal SI
//! prefixes only (`k` = 1e3).

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::time::{VirtualTime, NANOS_PER_SEC};

/// A data rate in bits per second. Always non-zero once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataRate(u64);

impl DataRate {
    /// 1 Mbps.
    pub const MBPS_1: DataRate = DataRate(1_000_000);
    /// 10 Mbps.
    pub const MBPS_10: DataRate = DataRate(10_000_000);

    /// Construct from bits per second. Returns `None` for zero.
    pub fn from_bps(bps: u64) -> Option<Self> {
        (bps > 0).then_some(DataRate(bps))
    }

    /// Construct from megabits per second.
    pub fn from_mbps(mbps: u64) -> Option<Self> {
        Self::from_bps(mbps.checked_mul(1_000_000)?)
    }

    /// Bits per second.
    #[inline]
    pub fn bps(self) -> u64 {
        self.0
    }

    /// Time needed to push `bytes` onto a link of this rate.
    ///
    /// Rounded to the nearest nanosecond. Uses 128-bit intermediates so
    /// large packets on slow links cannot overflow.
    pub fn tx_time(self, bytes: u32) -> VirtualTime {
        let bits = u128::from(bytes) * 8;
        let num = bits * u128::from(NANOS_PER_SEC);
        let den = u128::from(self.0);
        let nanos = (num + den / 2) / den;
        VirtualTime::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl std::fmt::Display for DataRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bps = self.0;
        if bps % 1_000_000_000 == 0 {
            write!(f, "{}Gbps", bps / 1_000_000_000)
        } else if bps % 1_000_000 == 0 {
            write!(f, "{}Mbps", bps / 1_000_000)
        } else if bps % 1_000 == 0 {
            write!(f, "{}kbps", bps / 1_000)
        } else {
            write!(f, "{}bps", bps)
        }
    }
}

/// Why a rate string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateParseError {
    #[error("empty data rate")]
    Empty,
    #[error("unknown data rate unit in '{0}' (expected bps, kbps, Mbps or Gbps)")]
    UnknownUnit(String),
    #[error("invalid number in data rate '{0}'")]
    InvalidNumber(String),
    #[error("data rate '{0}' must be positive")]
    NotPositive(String),
}

impl FromStr for DataRate {
    type Err = RateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RateParseError::Empty);
        }

        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);

        let multiplier: f64 = match unit.trim() {
            "" | "bps" | "b/s" => 1.0,
            "kbps" | "Kbps" | "kb/s" => 1e3,
            "Mbps" | "mbps" | "Mb/s" => 1e6,
            "Gbps" | "gbps" | "Gb/s" => 1e9,
            _ => return Err(RateParseError::UnknownUnit(s.to_string())),
        };

        let value: f64 = number
            .parse()
            .map_err(|_| RateParseError::InvalidNumber(s.to_string()))?;
        let bps = (value * multiplier).round();
        if !bps.is_finite() || bps < 1.0 || bps > u64::MAX as f64 {
            return Err(RateParseError::NotPositive(s.to_string()));
        }
        Ok(DataRate(bps as u64))
    }
}

impl Serialize for DataRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DataRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
