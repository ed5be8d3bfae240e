//! Tagged pipeline-wide error kinds. These are reported via counters in the
//! hot path (never surfaced as panics) and surfaced as structured errors at
//! the query boundary.

use thiserror::Error;

/// Errors raised while validating inbound ticks or query parameters.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ValidationError {
    #[error("invalid tick: {0}")]
    InvalidTick(String),

    #[error("symbol '{0}' is not in the configured symbol set")]
    UnknownSymbol(String),

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("invalid range: from={from} to={to}")]
    InvalidRange { from: i64, to: i64 },

    #[error("range too large: {span}s exceeds max_range {max_range}s")]
    RangeTooLarge { span: i64, max_range: i64 },
}

/// Error surfaced to a query caller. `BreakerOpen`/`Store` map to a 5xx-class
/// response in whatever HTTP layer binds to this crate; `Validation` maps to
/// 400.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("downstream store is unavailable (circuit open)")]
    BreakerOpen,

    #[error("store error: {0}")]
    Store(String),
}
