//! Pure window-alignment functions shared by the aggregator, the store, and
//! the query service. No state, no I/O.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed aggregation intervals. Ordering here is the rotation order the
/// aggregator must iterate in: `S1, S5, M1, M15, H1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Interval {
    S1,
    S5,
    M1,
    M15,
    H1,
}

impl Interval {
    pub const ALL: [Interval; 5] = [
        Interval::S1,
        Interval::S5,
        Interval::M1,
        Interval::M15,
        Interval::H1,
    ];

    /// Window duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        match self {
            Interval::S1 => 1_000,
            Interval::S5 => 5_000,
            Interval::M1 => 60_000,
            Interval::M15 => 900_000,
            Interval::H1 => 3_600_000,
        }
    }

    /// Canonical short code used as the `interval_type` column and as the
    /// TradingView-style query parameter alias target.
    pub fn code(&self) -> &'static str {
        match self {
            Interval::S1 => "S1",
            Interval::S5 => "S5",
            Interval::M1 => "M1",
            Interval::M15 => "M15",
            Interval::H1 => "H1",
        }
    }

    /// Aligns a timestamp (ms) down to the start of its window for this
    /// interval. Floors toward -infinity so negative timestamps behave
    /// mathematically rather than truncating toward zero.
    pub fn align(&self, ts_ms: i64) -> i64 {
        let d = self.duration_ms();
        ts_ms.div_euclid(d) * d
    }

    /// True if `a` and `b` fall in the same half-open window.
    pub fn same_window(&self, a_ms: i64, b_ms: i64) -> bool {
        self.align(a_ms) == self.align(b_ms)
    }

    /// Number of whole windows between the aligned starts of `a` and `b`.
    /// Positive when `b` is later than `a`.
    pub fn windows_between(&self, a_ms: i64, b_ms: i64) -> i64 {
        (self.align(b_ms) - self.align(a_ms)) / self.duration_ms()
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    /// Accepts both the TradingView-style query aliases (`1s|5s|1m|15m|1h`)
    /// and the internal codes (`s1|s5|m1|m15|h1`), case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "1s" | "s1" => Ok(Interval::S1),
            "5s" | "s5" => Ok(Interval::S5),
            "1m" | "m1" => Ok(Interval::M1),
            "15m" | "m15" => Ok(Interval::M15),
            "1h" | "h1" => Ok(Interval::H1),
            _ => Err(anyhow!(
                "Invalid interval: '{}'. Valid options: 1s, 5s, 1m, 15m, 1h",
                s
            )),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_is_le_and_idempotent() {
        for interval in Interval::ALL {
            for ts in [0_i64, 1, 999, 1_000, 1_733_529_459_000, -1, -1_000, -1_001] {
                let aligned = interval.align(ts);
                assert!(aligned <= ts, "{interval:?} align({ts}) = {aligned} should be <= ts");
                assert_eq!(interval.align(aligned), aligned, "align must be idempotent");
            }
        }
    }

    #[test]
    fn same_window_matches_alignment() {
        let i = Interval::M1;
        assert!(i.same_window(1_733_529_423_000, 1_733_529_459_000));
        assert!(!i.same_window(1_733_529_423_000, 1_733_529_480_000));
    }

    #[test]
    fn half_open_window_boundary() {
        let i = Interval::M1;
        let ws = i.align(1_733_529_420_000);
        assert_eq!(ws, 1_733_529_420_000);
        // tick exactly at ws + d belongs to the next window
        assert_ne!(i.align(ws + i.duration_ms()), ws);
        assert_eq!(i.align(ws + i.duration_ms() - 1), ws);
    }

    #[test]
    fn negative_timestamps_floor_toward_negative_infinity() {
        let i = Interval::S1;
        assert_eq!(i.align(-1), -1_000);
        assert_eq!(i.align(-1_000), -1_000);
        assert_eq!(i.align(-1_001), -2_000);
    }

    #[test]
    fn from_str_accepts_aliases_case_insensitively() {
        assert_eq!(Interval::from_str("1m").unwrap(), Interval::M1);
        assert_eq!(Interval::from_str("M1").unwrap(), Interval::M1);
        assert_eq!(Interval::from_str("m1").unwrap(), Interval::M1);
        assert_eq!(Interval::from_str("15M").unwrap(), Interval::M15);
        assert!(Interval::from_str("7m").is_err());
    }

    #[test]
    fn windows_between_counts_boundaries() {
        let i = Interval::S1;
        assert_eq!(i.windows_between(0, 3_000), 3);
        assert_eq!(i.windows_between(3_000, 0), -3);
    }
}
