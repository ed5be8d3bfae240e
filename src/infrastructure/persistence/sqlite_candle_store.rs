//! SQLite-backed [`CandleStore`], grounded on the teacher's
//! `infrastructure/persistence/database.rs` bootstrap style: schema is
//! created inline with `CREATE TABLE IF NOT EXISTS` at startup, no external
//! migration runner (migration tooling is an out-of-scope collaborator per
//! the spec).

use crate::domain::market::candle::Candle;
use crate::domain::market::store::{CandleStore, StoreError};
use crate::domain::market::time_grid::Interval;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub struct SqliteCandleStore {
    pool: SqlitePool,
}

impl SqliteCandleStore {
    pub async fn connect(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .context("failed to create database directory")?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // An in-memory database only survives on the connection that created
        // it, so pin the pool to a single connection in that case; a
        // file-backed database can safely share across a small pool.
        let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("failed to connect to sqlite database")?;

        info!(db_url, "connected to candle store");

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                symbol TEXT NOT NULL,
                interval_type TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume INTEGER NOT NULL,
                trade_count INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (symbol, interval_type, timestamp)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create candles table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_candles_symbol_interval_time_desc
            ON candles (symbol, interval_type, timestamp DESC);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create symbol/interval/time index")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_candles_time_desc
            ON candles (timestamp DESC);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create time index")?;

        info!("candle store schema initialized");
        Ok(())
    }

    fn row_to_candle(row: &sqlx::sqlite::SqliteRow) -> Result<Candle, StoreError> {
        Ok(Candle {
            time_ms: row.try_get("timestamp").map_err(store_err)?,
            open: row.try_get("open").map_err(store_err)?,
            high: row.try_get("high").map_err(store_err)?,
            low: row.try_get("low").map_err(store_err)?,
            close: row.try_get("close").map_err(store_err)?,
            volume: row.try_get("volume").map_err(store_err)?,
        })
    }
}

fn store_err(e: sqlx::Error) -> StoreError {
    StoreError::Transient(e.to_string())
}

#[async_trait]
impl CandleStore for SqliteCandleStore {
    async fn save(
        &self,
        symbol: &str,
        interval: Interval,
        candle: Candle,
    ) -> Result<(), StoreError> {
        let now = Utc::now().timestamp_millis();
        // True upsert-merge: re-saving the same (symbol, interval, time_ms)
        // key overwrites the OHLCV fields, which is what the late-event
        // reopen path requires (unlike a bare `INSERT OR IGNORE`).
        sqlx::query(
            r#"
            INSERT INTO candles
                (symbol, interval_type, timestamp, open, high, low, close, volume, trade_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (symbol, interval_type, timestamp) DO UPDATE SET
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close,
                volume = excluded.volume,
                trade_count = excluded.trade_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(symbol)
        .bind(interval.code())
        .bind(candle.time_ms)
        .bind(candle.open)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.close)
        .bind(candle.volume)
        .bind(candle.volume) // trade_count mirrors tick-count volume; see DESIGN.md
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn find_by_exact_time(
        &self,
        symbol: &str,
        interval: Interval,
        time_ms: i64,
    ) -> Result<Option<Candle>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM candles WHERE symbol = ? AND interval_type = ? AND timestamp = ?",
        )
        .bind(symbol)
        .bind(interval.code())
        .bind(time_ms)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.as_ref().map(Self::row_to_candle).transpose()
    }

    async fn find_by_range(
        &self,
        symbol: &str,
        interval: Interval,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Candle>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM candles
            WHERE symbol = ? AND interval_type = ? AND timestamp >= ? AND timestamp <= ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(symbol)
        .bind(interval.code())
        .bind(from_ms)
        .bind(to_ms)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(Self::row_to_candle).collect()
    }

    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM candles WHERE timestamp < ?")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM candles")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        let count: i64 = row.try_get("count").map_err(store_err)?;
        Ok(count as u64)
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteCandleStore {
        SqliteCandleStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn save_then_find_by_exact_time_round_trips() {
        let store = store().await;
        let c = Candle::new(1000, 1.0, 2.0, 0.5, 1.5, 3).unwrap();
        store.save("BTCUSD", Interval::S1, c).await.unwrap();

        let found = store
            .find_by_exact_time("BTCUSD", Interval::S1, 1000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, c);
    }

    #[tokio::test]
    async fn save_is_idempotent_by_key() {
        let store = store().await;
        let c = Candle::new(1000, 1.0, 2.0, 0.5, 1.5, 3).unwrap();
        store.save("BTCUSD", Interval::S1, c).await.unwrap();
        store.save("BTCUSD", Interval::S1, c).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn save_upserts_on_conflicting_key() {
        let store = store().await;
        let c1 = Candle::new(1000, 1.0, 2.0, 0.5, 1.5, 3).unwrap();
        let c2 = Candle::new(1000, 1.0, 3.0, 0.5, 2.0, 4).unwrap();
        store.save("BTCUSD", Interval::S1, c1).await.unwrap();
        store.save("BTCUSD", Interval::S1, c2).await.unwrap();

        let found = store
            .find_by_exact_time("BTCUSD", Interval::S1, 1000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, c2);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn find_by_range_is_inclusive_and_ascending() {
        let store = store().await;
        for ts in [1000, 2000, 3000, 4000, 5000] {
            let c = Candle::new(ts, 1.0, 1.0, 1.0, 1.0, 1).unwrap();
            store.save("BTCUSD", Interval::S1, c).await.unwrap();
        }

        let found = store
            .find_by_range("BTCUSD", Interval::S1, 2000, 4000)
            .await
            .unwrap();
        let times: Vec<i64> = found.iter().map(|c| c.time_ms).collect();
        assert_eq!(times, vec![2000, 3000, 4000]);
    }

    #[tokio::test]
    async fn delete_older_than_removes_matching_rows() {
        let store = store().await;
        for ts in [1000, 2000, 3000] {
            let c = Candle::new(ts, 1.0, 1.0, 1.0, 1.0, 1).unwrap();
            store.save("BTCUSD", Interval::S1, c).await.unwrap();
        }
        let removed = store.delete_older_than(2500).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn is_healthy_reports_true_for_open_connection() {
        let store = store().await;
        assert!(store.is_healthy().await);
    }

    #[tokio::test]
    async fn connect_creates_missing_parent_directories_and_persists_across_reconnects() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("candles.db");
        let db_url = format!("sqlite://{}", db_path.to_str().unwrap());

        {
            let store = SqliteCandleStore::connect(&db_url).await.unwrap();
            let c = Candle::new(1000, 1.0, 1.0, 1.0, 1.0, 1).unwrap();
            store.save("BTCUSD", Interval::S1, c).await.unwrap();
        }

        assert!(db_path.exists());

        let reopened = SqliteCandleStore::connect(&db_url).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
