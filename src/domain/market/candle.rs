//! Immutable OHLCV candle value and its invariants.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("high ({high}) must be >= max(open, close, low) ({expected})")]
    HighTooLow { high: String, expected: String },
    #[error("low ({low}) must be <= min(open, close, high) ({expected})")]
    LowTooHigh { low: String, expected: String },
    #[error("volume must be non-negative, got {0}")]
    NegativeVolume(i64),
}

/// An immutable, already-validated OHLCV candle.
///
/// `time_ms` is always an aligned window start for the interval it belongs
/// to; alignment itself is the caller's responsibility (see
/// [`crate::domain::market::time_grid::Interval::align`]) because `Candle`
/// has no notion of which interval it was built for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Candle {
    /// Constructs a candle, checking the OHLC invariants. This is the only
    /// path application code outside this module should use.
    pub fn new(
        time_ms: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
    ) -> Result<Self, InvariantViolation> {
        let candle = Candle {
            time_ms,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.check_invariants()?;
        Ok(candle)
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let max_ohl = self.open.max(self.close).max(self.low);
        if self.high < max_ohl {
            return Err(InvariantViolation::HighTooLow {
                high: self.high.to_string(),
                expected: max_ohl.to_string(),
            });
        }
        let min_ohh = self.open.min(self.close).min(self.high);
        if self.low > min_ohh {
            return Err(InvariantViolation::LowTooHigh {
                low: self.low.to_string(),
                expected: min_ohh.to_string(),
            });
        }
        if self.volume < 0 {
            return Err(InvariantViolation::NegativeVolume(self.volume));
        }
        Ok(())
    }

    /// Builds the first candle of a window from a single tick's mid price.
    pub fn opening(time_ms: i64, mid: f64) -> Self {
        Candle {
            time_ms,
            open: mid,
            high: mid,
            low: mid,
            close: mid,
            volume: 1,
        }
    }

    /// Returns a new candle reflecting one more in-window tick. `open` is
    /// preserved; `high`/`low` widen to include `mid`; `close` becomes
    /// `mid`; `volume` increments by one tick.
    pub fn updated_with(&self, mid: f64) -> Self {
        Candle {
            time_ms: self.time_ms,
            open: self.open,
            high: self.high.max(mid),
            low: self.low.min(mid),
            close: mid,
            volume: self.volume + 1,
        }
    }

    /// Late-event merge against a previously persisted (or in-memory)
    /// candle: `open` preserved, `high`/`low` widen, `close` becomes the
    /// late tick's mid, `volume` increments.
    pub fn merged_with_late_tick(&self, mid: f64) -> Self {
        self.updated_with(mid)
    }
}
