//! The aggregator: turns a stream of ticks into OHLCV candles across the
//! fixed set of intervals, one per symbol per interval, and persists
//! completed candles as they rotate out.
//!
//! This is the generalized, multi-interval descendant of the teacher's
//! `CandleBuilder`/`CandleAggregator` pair in
//! `application/market_data/candle_aggregator.rs`: where the teacher tracked
//! one timeframe per builder, `Aggregator` tracks all five fixed intervals
//! per symbol behind a single `ActiveMap`, and adds the late-event
//! tolerance/reopen path the teacher's version didn't need.

use crate::domain::market::candle::Candle;
use crate::domain::market::store::CandleStore;
use crate::domain::market::tick::Tick;
use crate::domain::market::time_grid::Interval;
use crate::infrastructure::core::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::infrastructure::observability::Metrics;
use arc_swap::ArcSwapOption;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{error, warn};

type ActiveKey = (String, Interval);

/// Owns the live, in-flight candle for every `(symbol, interval)` pair the
/// aggregator has ever seen a tick for. Map *structure* (which keys exist)
/// is mutated only by the consumer thread; each entry's *contents* are
/// published via `ArcSwapOption` so a concurrent reader (`snapshot`) always
/// sees a whole, never a torn, candle without taking a lock per read.
pub struct Aggregator<S: CandleStore> {
    active: RwLock<HashMap<ActiveKey, Arc<ArcSwapOption<Candle>>>>,
    store: Arc<S>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<Metrics>,
    late_event_tolerance_ms: i64,
    async_write: bool,
}

impl<S: CandleStore + 'static> Aggregator<S> {
    pub fn new(
        store: Arc<S>,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<Metrics>,
        late_event_tolerance_ms: i64,
        async_write: bool,
    ) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            store,
            breaker,
            metrics,
            late_event_tolerance_ms,
            async_write,
        }
    }

    /// Processes a single tick against every fixed interval in rotation
    /// order. A persistence failure on one interval never prevents the
    /// others from being processed for this tick.
    pub async fn on_tick(&self, tick: Tick) {
        let started = Instant::now();
        let symbol = tick.symbol().to_string();
        let mid = tick.mid();

        self.metrics.events_processed_total.inc();

        for interval in Interval::ALL {
            let window_start = interval.align(tick.ts_ms);
            self.process_interval(&symbol, interval, window_start, mid).await;
        }

        self.metrics
            .tick_processing_seconds
            .observe(started.elapsed().as_secs_f64());
    }

    async fn process_interval(&self, symbol: &str, interval: Interval, window_start: i64, mid: f64) {
        let entry = self.entry_for(symbol, interval);
        let current = entry.load_full();

        match current {
            None => {
                entry.store(Some(Arc::new(Candle::opening(window_start, mid))));
            }
            Some(live) => {
                if live.time_ms < window_start {
                    let completed = *live;
                    entry.store(Some(Arc::new(Candle::opening(window_start, mid))));
                    self.metrics.candles_completed_total.inc();
                    self.persist(symbol, interval, completed).await;
                } else if live.time_ms == window_start {
                    let updated = live.updated_with(mid);
                    entry.store(Some(Arc::new(updated)));
                } else {
                    self.handle_late_event(symbol, interval, window_start, mid, live.time_ms)
                        .await;
                }
            }
        }
    }

    /// `window_start` is strictly behind the currently-live window: either
    /// still within tolerance (look up/merge/persist) or too old (drop).
    async fn handle_late_event(
        &self,
        symbol: &str,
        interval: Interval,
        window_start: i64,
        mid: f64,
        live_window_start: i64,
    ) {
        let lag_ms = live_window_start - window_start;
        if lag_ms > self.late_event_tolerance_ms {
            self.metrics.late_events_dropped_total.inc();
            return;
        }

        let found = self
            .breaker
            .call(self.store.find_by_exact_time(symbol, interval, window_start))
            .await;

        let previous = match found {
            Ok(candle) => candle,
            Err(CircuitBreakerError::Open) => {
                self.metrics.persist_skipped_total.inc();
                return;
            }
            Err(CircuitBreakerError::Inner(e)) => {
                error!(symbol, %interval, error = %e, "late-event lookup failed");
                self.metrics.aggregator_errors_total.inc();
                return;
            }
        };

        let merged = match previous {
            Some(existing) => existing.merged_with_late_tick(mid),
            None => Candle::opening(window_start, mid),
        };

        self.persist_awaited(symbol, interval, merged).await;
    }

    /// Rotation-triggered persistence. Honors `async_write`: fire-and-forget
    /// via `tokio::spawn` when configured for throughput (the spawned task
    /// is still driven forward by the consumer thread's own runtime on its
    /// next `block_on`), inline (awaited before the next tick) otherwise.
    async fn persist(&self, symbol: &str, interval: Interval, candle: Candle) {
        if self.async_write {
            let store = self.store.clone();
            let breaker = self.breaker.clone();
            let metrics = self.metrics.clone();
            let symbol = symbol.to_string();
            tokio::spawn(async move {
                Self::persist_via(&store, &breaker, &metrics, &symbol, interval, candle).await;
            });
        } else {
            self.persist_awaited(symbol, interval, candle).await;
        }
    }

    async fn persist_awaited(&self, symbol: &str, interval: Interval, candle: Candle) {
        Self::persist_via(&self.store, &self.breaker, &self.metrics, symbol, interval, candle).await;
    }

    async fn persist_via(
        store: &Arc<S>,
        breaker: &Arc<CircuitBreaker>,
        metrics: &Arc<Metrics>,
        symbol: &str,
        interval: Interval,
        candle: Candle,
    ) {
        let result = breaker.call(store.save(symbol, interval, candle)).await;
        match result {
            Ok(()) => {}
            Err(CircuitBreakerError::Open) => {
                metrics.persist_skipped_total.inc();
            }
            Err(CircuitBreakerError::Inner(e)) => {
                warn!(symbol, %interval, error = %e, "candle persist failed");
                metrics.aggregator_errors_total.inc();
            }
        }
    }

    fn entry_for(&self, symbol: &str, interval: Interval) -> Arc<ArcSwapOption<Candle>> {
        {
            let map = self.active.read().unwrap();
            if let Some(entry) = map.get(&(symbol.to_string(), interval)) {
                return entry.clone();
            }
        }
        let mut map = self.active.write().unwrap();
        map.entry((symbol.to_string(), interval))
            .or_insert_with(|| Arc::new(ArcSwapOption::empty()))
            .clone()
    }

    /// Atomic, lock-cheap read of the live candle for `(symbol, interval)`.
    /// Returns `None` until the first tick for that key has arrived.
    pub fn snapshot(&self, symbol: &str, interval: Interval) -> Option<Candle> {
        let map = self.active.read().unwrap();
        map.get(&(symbol.to_string(), interval))
            .and_then(|entry| entry.load_full())
            .map(|arc| *arc)
    }

    /// Called by the consumer loop when `on_tick` unwinds. Counts the event
    /// so a caught panic is still visible in metrics instead of vanishing.
    pub fn record_caught_panic(&self) {
        self.metrics.aggregator_errors_total.inc();
    }

    /// Persists every currently-live candle as-is, without rotating it out
    /// of `ActiveMap`. Used on shutdown when `flush_on_shutdown` is set so
    /// in-progress candles aren't lost.
    pub async fn flush_all(&self) {
        let snapshot: Vec<(ActiveKey, Candle)> = {
            let map = self.active.read().unwrap();
            map.iter()
                .filter_map(|(key, entry)| entry.load_full().map(|c| (key.clone(), *c)))
                .collect()
        };

        for ((symbol, interval), candle) in snapshot {
            self.persist_awaited(&symbol, interval, candle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::core::circuit_breaker::CircuitBreakerConfig;
    use crate::infrastructure::persistence::InMemoryCandleStore;

    fn setup() -> Aggregator<InMemoryCandleStore> {
        let store = Arc::new(InMemoryCandleStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let breaker = Arc::new(CircuitBreaker::new("test", CircuitBreakerConfig::default(), metrics.clone()));
        Aggregator::new(store, breaker, metrics, 5_000, false)
    }

    #[tokio::test]
    async fn first_tick_opens_every_interval() {
        let agg = setup();
        agg.on_tick(Tick::new("BTCUSD", 100.0, 101.0, 1_000)).await;
        for interval in Interval::ALL {
            let c = agg.snapshot("BTCUSD", interval).unwrap();
            assert_eq!(c.open, 100.5);
            assert_eq!(c.volume, 1);
        }
    }

    #[tokio::test]
    async fn same_window_ticks_widen_high_low_and_move_close() {
        let agg = setup();
        agg.on_tick(Tick::new("BTCUSD", 100.0, 100.0, 1_000)).await;
        agg.on_tick(Tick::new("BTCUSD", 105.0, 105.0, 1_500)).await;
        agg.on_tick(Tick::new("BTCUSD", 95.0, 95.0, 1_900)).await;

        let c = agg.snapshot("BTCUSD", Interval::S1).unwrap();
        assert_eq!(c.open, 100.0);
        assert_eq!(c.high, 105.0);
        assert_eq!(c.low, 95.0);
        assert_eq!(c.close, 95.0);
        assert_eq!(c.volume, 3);
    }

    #[tokio::test]
    async fn rotation_replaces_the_live_candle_with_a_fresh_one() {
        let agg = setup();
        agg.on_tick(Tick::new("BTCUSD", 100.0, 100.0, 1_000)).await;
        agg.on_tick(Tick::new("BTCUSD", 200.0, 200.0, 2_500)).await;

        let c = agg.snapshot("BTCUSD", Interval::S1).unwrap();
        assert_eq!(c.time_ms, Interval::S1.align(2_500));
        assert_eq!(c.open, 200.0);
        assert_eq!(c.volume, 1);
    }

    #[tokio::test]
    async fn late_event_within_tolerance_is_dropped_from_active_but_not_counted() {
        let agg = setup();
        agg.on_tick(Tick::new("BTCUSD", 100.0, 100.0, 1_000)).await;
        agg.on_tick(Tick::new("BTCUSD", 200.0, 200.0, 3_000)).await;
        // late tick belonging to the first (already-rotated) window
        agg.on_tick(Tick::new("BTCUSD", 150.0, 150.0, 1_500)).await;

        assert_eq!(agg.metrics.late_events_dropped_total.get(), 0);
        let live = agg.snapshot("BTCUSD", Interval::S1).unwrap();
        assert_eq!(live.time_ms, Interval::S1.align(3_000));
    }

    #[tokio::test]
    async fn late_event_beyond_tolerance_increments_drop_counter() {
        let agg = setup();
        agg.on_tick(Tick::new("BTCUSD", 100.0, 100.0, 1_000)).await;
        agg.on_tick(Tick::new("BTCUSD", 200.0, 200.0, 20_000)).await;
        agg.on_tick(Tick::new("BTCUSD", 150.0, 150.0, 1_500)).await;

        assert_eq!(agg.metrics.late_events_dropped_total.get(), 1);
    }

    #[tokio::test]
    async fn distinct_symbols_do_not_share_active_entries() {
        let agg = setup();
        agg.on_tick(Tick::new("BTCUSD", 100.0, 100.0, 1_000)).await;
        agg.on_tick(Tick::new("ETHUSD", 50.0, 50.0, 1_000)).await;

        assert_eq!(agg.snapshot("BTCUSD", Interval::S1).unwrap().open, 100.0);
        assert_eq!(agg.snapshot("ETHUSD", Interval::S1).unwrap().open, 50.0);
    }
}
