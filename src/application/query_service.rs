//! The read-side surface an external HTTP layer would bind to. No route
//! handler lives in this crate (the web framework is explicitly an outside
//! collaborator); `QueryService` is the plain async API that layer calls.

use crate::domain::errors::{QueryError, ValidationError};
use crate::domain::market::candle::Candle;
use crate::domain::market::store::CandleStore;
use crate::domain::market::time_grid::Interval;
use crate::infrastructure::core::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::infrastructure::observability::Metrics;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

/// TradingView-compatible columnar OHLCV response.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryResponse {
    /// `"ok"` / `"no_data"`, following the TradingView UDF convention.
    pub s: String,
    pub t: Vec<i64>,
    pub o: Vec<f64>,
    pub h: Vec<f64>,
    pub l: Vec<f64>,
    pub c: Vec<f64>,
    pub v: Vec<i64>,
}

impl HistoryResponse {
    fn from_candles(candles: Vec<Candle>) -> Self {
        if candles.is_empty() {
            return Self {
                s: "no_data".to_string(),
                t: vec![],
                o: vec![],
                h: vec![],
                l: vec![],
                c: vec![],
                v: vec![],
            };
        }
        let mut resp = Self {
            s: "ok".to_string(),
            t: Vec::with_capacity(candles.len()),
            o: Vec::with_capacity(candles.len()),
            h: Vec::with_capacity(candles.len()),
            l: Vec::with_capacity(candles.len()),
            c: Vec::with_capacity(candles.len()),
            v: Vec::with_capacity(candles.len()),
        };
        for candle in candles {
            resp.t.push(candle.time_ms / 1_000);
            resp.o.push(candle.open);
            resp.h.push(candle.high);
            resp.l.push(candle.low);
            resp.c.push(candle.close);
            resp.v.push(candle.volume);
        }
        resp
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct DroppedEventsSnapshot {
    pub late_events_dropped: u64,
    pub ring_buffer_events_dropped: u64,
}

pub struct QueryService<S: CandleStore> {
    store: Arc<S>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<Metrics>,
    symbols: Vec<String>,
    max_range_secs: i64,
}

impl<S: CandleStore> QueryService<S> {
    pub fn new(
        store: Arc<S>,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<Metrics>,
        symbols: Vec<String>,
        max_range_secs: i64,
    ) -> Self {
        Self {
            store,
            breaker,
            metrics,
            symbols,
            max_range_secs,
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.symbols.clone()
    }

    pub fn dropped_events(&self) -> DroppedEventsSnapshot {
        DroppedEventsSnapshot {
            late_events_dropped: self.metrics.late_events_dropped_total.get(),
            ring_buffer_events_dropped: self.metrics.ring_buffer_events_dropped_total.get(),
        }
    }

    /// `from_s`/`to_s` are unix seconds, inclusive on both ends, matching the
    /// TradingView `history` convention.
    pub async fn history(
        &self,
        symbol: &str,
        interval: &str,
        from_s: i64,
        to_s: i64,
    ) -> Result<HistoryResponse, QueryError> {
        let symbol = self.validate_symbol(symbol)?;
        let interval = Interval::from_str(interval)
            .map_err(|e| ValidationError::InvalidInterval(e.to_string()))?;
        self.validate_range(from_s, to_s)?;

        let from_ms = from_s * 1_000;
        let to_ms = to_s * 1_000;

        let result = self
            .breaker
            .call(self.store.find_by_range(&symbol, interval, from_ms, to_ms))
            .await;

        match result {
            Ok(candles) => Ok(HistoryResponse::from_candles(candles)),
            Err(CircuitBreakerError::Open) => Err(QueryError::BreakerOpen),
            Err(CircuitBreakerError::Inner(e)) => Err(QueryError::Store(e.to_string())),
        }
    }

    fn validate_symbol(&self, symbol: &str) -> Result<String, ValidationError> {
        let upper = symbol.to_uppercase();
        let len_ok = (6..=10).contains(&upper.len());
        let charset_ok = upper.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if !len_ok || !charset_ok {
            return Err(ValidationError::InvalidTick(format!(
                "symbol '{symbol}' must be 6-10 uppercase alphanumeric characters"
            )));
        }
        if !self.symbols.iter().any(|s| s == &upper) {
            return Err(ValidationError::UnknownSymbol(upper));
        }
        Ok(upper)
    }

    fn validate_range(&self, from_s: i64, to_s: i64) -> Result<(), ValidationError> {
        if from_s <= 0 || to_s <= from_s {
            return Err(ValidationError::InvalidRange { from: from_s, to: to_s });
        }
        let span = to_s - from_s;
        if span > self.max_range_secs {
            return Err(ValidationError::RangeTooLarge {
                span,
                max_range: self.max_range_secs,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::candle::Candle;
    use crate::infrastructure::core::circuit_breaker::CircuitBreakerConfig;
    use crate::infrastructure::persistence::InMemoryCandleStore;

    async fn setup() -> QueryService<InMemoryCandleStore> {
        let store = Arc::new(InMemoryCandleStore::new());
        store
            .save("BTCUSD", Interval::M1, Candle::new(60_000, 100.0, 110.0, 90.0, 105.0, 5).unwrap())
            .await
            .unwrap();
        store
            .save("BTCUSD", Interval::M1, Candle::new(120_000, 105.0, 115.0, 95.0, 108.0, 7).unwrap())
            .await
            .unwrap();
        let metrics = Arc::new(Metrics::new().unwrap());
        let breaker = Arc::new(CircuitBreaker::new("test", CircuitBreakerConfig::default(), metrics.clone()));
        QueryService::new(store, breaker, metrics, vec!["BTCUSD".to_string()], 604_800)
    }

    #[tokio::test]
    async fn history_returns_columnar_ok_response_for_known_range() {
        let svc = setup().await;
        let resp = svc.history("BTCUSD", "1m", 1, 200).await.unwrap();
        assert_eq!(resp.s, "ok");
        assert_eq!(resp.t, vec![60, 120]);
        assert_eq!(resp.o, vec![100.0, 105.0]);
    }

    #[tokio::test]
    async fn history_reports_no_data_for_empty_range() {
        let svc = setup().await;
        let resp = svc.history("BTCUSD", "1m", 10_000, 20_000).await.unwrap();
        assert_eq!(resp.s, "no_data");
    }

    #[tokio::test]
    async fn history_serializes_to_the_tradingview_columnar_shape() {
        let svc = setup().await;
        let resp = svc.history("BTCUSD", "1m", 1, 200).await.unwrap();
        let json = serde_json::to_value(&resp).unwrap();
        let obj = json.as_object().unwrap();
        for key in ["s", "t", "o", "h", "l", "c", "v"] {
            assert!(obj.contains_key(key), "missing key '{key}' in serialized response");
        }
    }

    #[tokio::test]
    async fn rejects_unknown_symbol() {
        let svc = setup().await;
        let err = svc.history("ETHUSD", "1m", 1, 200).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation(ValidationError::UnknownSymbol(_))));
    }

    #[tokio::test]
    async fn rejects_malformed_symbol_before_checking_membership() {
        let svc = setup().await;
        let err = svc.history("btc", "1m", 1, 200).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation(ValidationError::InvalidTick(_))));
    }

    #[tokio::test]
    async fn rejects_bad_interval_alias() {
        let svc = setup().await;
        let err = svc.history("BTCUSD", "7m", 1, 200).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation(ValidationError::InvalidInterval(_))));
    }

    #[tokio::test]
    async fn rejects_inverted_range() {
        let svc = setup().await;
        let err = svc.history("BTCUSD", "1m", 200, 1).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation(ValidationError::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn rejects_range_exceeding_max() {
        let svc = setup().await;
        let err = svc.history("BTCUSD", "1m", 1, 1 + 700_000).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation(ValidationError::RangeTooLarge { .. })));
    }

    #[tokio::test]
    async fn symbols_and_dropped_events_expose_configured_state() {
        let svc = setup().await;
        assert_eq!(svc.symbols(), vec!["BTCUSD".to_string()]);
        let snap = svc.dropped_events();
        assert_eq!(snap.late_events_dropped, 0);
        assert_eq!(snap.ring_buffer_events_dropped, 0);
    }
}
