//! In-memory [`CandleStore`], grounded on the teacher's
//! `infrastructure/repositories/in_memory.rs` thread-safe-via-lock pattern.
//! Used by pipeline unit tests so aggregator/circuit-breaker logic doesn't
//! need a real sqlite file.

use crate::domain::market::candle::Candle;
use crate::domain::market::store::{CandleStore, StoreError};
use crate::domain::market::time_grid::Interval;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

type Key = (String, Interval, i64);

#[derive(Default)]
pub struct InMemoryCandleStore {
    rows: RwLock<BTreeMap<Key, Candle>>,
}

impl InMemoryCandleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CandleStore for InMemoryCandleStore {
    async fn save(
        &self,
        symbol: &str,
        interval: Interval,
        candle: Candle,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write().unwrap();
        rows.insert((symbol.to_string(), interval, candle.time_ms), candle);
        Ok(())
    }

    async fn find_by_exact_time(
        &self,
        symbol: &str,
        interval: Interval,
        time_ms: i64,
    ) -> Result<Option<Candle>, StoreError> {
        let rows = self.rows.read().unwrap();
        Ok(rows.get(&(symbol.to_string(), interval, time_ms)).copied())
    }

    async fn find_by_range(
        &self,
        symbol: &str,
        interval: Interval,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Candle>, StoreError> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .iter()
            .filter(|((s, i, t), _)| s == symbol && *i == interval && *t >= from_ms && *t <= to_ms)
            .map(|(_, c)| *c)
            .collect())
    }

    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();
        rows.retain(|(_, _, t), _| *t >= cutoff_ms);
        Ok((before - rows.len()) as u64)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.rows.read().unwrap().len() as u64)
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_find_round_trips() {
        let store = InMemoryCandleStore::new();
        let c = Candle::new(1000, 1.0, 1.0, 1.0, 1.0, 1).unwrap();
        store.save("BTCUSD", Interval::S1, c).await.unwrap();
        assert_eq!(
            store
                .find_by_exact_time("BTCUSD", Interval::S1, 1000)
                .await
                .unwrap(),
            Some(c)
        );
    }

    #[tokio::test]
    async fn range_query_is_scoped_to_symbol_and_interval() {
        let store = InMemoryCandleStore::new();
        let c = Candle::new(1000, 1.0, 1.0, 1.0, 1.0, 1).unwrap();
        store.save("BTCUSD", Interval::S1, c).await.unwrap();
        store.save("ETHUSD", Interval::S1, c).await.unwrap();
        store.save("BTCUSD", Interval::M1, c).await.unwrap();

        let found = store
            .find_by_range("BTCUSD", Interval::S1, 0, 2000)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
