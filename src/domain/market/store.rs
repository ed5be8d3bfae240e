//! The `CandleStore` capability trait and the errors its implementations
//! report. Concrete backends live under `infrastructure::persistence`.

use super::candle::Candle;
use super::time_grid::Interval;
use async_trait::async_trait;
use thiserror::Error;

/// Errors a `CandleStore` implementation can report. These map directly to
/// the tagged error kinds in the design's error-handling policy:
/// `StoreTransient` is retryable and feeds the circuit breaker's failure
/// count, `StoreConflict` is treated as upsert success by callers, and
/// `StoreFatal` is only ever raised at boot (schema mismatch, auth failure)
/// and causes the process to exit.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient store error: {0}")]
    Transient(String),

    #[error("store conflict (treated as upsert success): {0}")]
    Conflict(String),

    #[error("fatal store error: {0}")]
    Fatal(String),
}

/// Persistent candle storage. All operations are idempotent or read-only;
/// `save` is an upsert keyed on `(symbol, interval, candle.time_ms)`.
#[async_trait]
pub trait CandleStore: Send + Sync {
    async fn save(&self, symbol: &str, interval: Interval, candle: Candle)
    -> Result<(), StoreError>;

    async fn find_by_exact_time(
        &self,
        symbol: &str,
        interval: Interval,
        time_ms: i64,
    ) -> Result<Option<Candle>, StoreError>;

    /// Inclusive on both ends, ascending by `time_ms`.
    async fn find_by_range(
        &self,
        symbol: &str,
        interval: Interval,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Candle>, StoreError>;

    /// Returns the number of rows removed.
    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<u64, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// Cheap liveness probe; must never itself trip the circuit breaker's
    /// failure counting (callers treat `false` as a health signal, not an
    /// error to retry).
    async fn is_healthy(&self) -> bool;
}
