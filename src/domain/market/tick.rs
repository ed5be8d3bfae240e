//! The unit of market data flowing through the ring buffer.

use serde::{Deserialize, Serialize};

/// A single bid/ask quote with a creation timestamp.
///
/// `Tick` is `Copy` so it can cross the ring buffer by value with no
/// allocation on the hot path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub symbol: [u8; 16],
    pub symbol_len: u8,
    pub bid: f64,
    pub ask: f64,
    pub ts_ms: i64,
}

impl Tick {
    /// Builds a tick, truncating symbols longer than 16 bytes. Symbols in
    /// this domain are 6-10 uppercase alphanumeric characters (see the
    /// query service's validation), so 16 bytes is always enough headroom.
    pub fn new(symbol: &str, bid: f64, ask: f64, ts_ms: i64) -> Self {
        let mut buf = [0u8; 16];
        let bytes = symbol.as_bytes();
        let len = bytes.len().min(16);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self {
            symbol: buf,
            symbol_len: len as u8,
            bid,
            ask,
            ts_ms,
        }
    }

    pub fn symbol(&self) -> &str {
        std::str::from_utf8(&self.symbol[..self.symbol_len as usize]).unwrap_or("")
    }

    /// `bid>0 ∧ ask>0 ∧ ask≥bid ∧ ts_ms>0`
    pub fn is_valid(&self) -> bool {
        self.bid > 0.0 && self.ask > 0.0 && self.ask >= self.bid && self.ts_ms > 0
    }

    /// `(bid+ask)/2`, the price used for OHLC aggregation.
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

impl Default for Tick {
    fn default() -> Self {
        Self {
            symbol: [0u8; 16],
            symbol_len: 0,
            bid: 0.0,
            ask: 0.0,
            ts_ms: 0,
        }
    }
}

/// Owned variant used at API boundaries (query/store layers) where `Copy`
/// semantics and a fixed-size inline buffer aren't useful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedTick {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub ts_ms: i64,
}

impl From<Tick> for OwnedTick {
    fn from(t: Tick) -> Self {
        Self {
            symbol: t.symbol().to_string(),
            bid: t.bid,
            ask: t.ask,
            ts_ms: t.ts_ms,
        }
    }
}
