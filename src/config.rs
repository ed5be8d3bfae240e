//! Runtime configuration, loaded from the environment the way the teacher's
//! `Config::from_env` does: `std::env::var` with `unwrap_or_else` defaults
//! and `FromStr` enums for anything with a closed set of valid values.

use anyhow::{Context, Result, bail};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    Yielding,
    BusySpin,
    Park,
}

impl FromStr for WaitStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "yielding" => Ok(WaitStrategy::Yielding),
            "busy_spin" | "busyspin" => Ok(WaitStrategy::BusySpin),
            "park" => Ok(WaitStrategy::Park),
            _ => bail!("invalid ring_buffer.wait_strategy: '{s}'. Must be yielding|busy_spin|park"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ring_buffer_size: usize,
    pub ring_buffer_wait_strategy: WaitStrategy,
    pub late_event_tolerance_ms: i64,
    pub circuit_breaker_failure_rate: f64,
    pub circuit_breaker_open_duration_ms: u64,
    pub circuit_breaker_half_open_trials: usize,
    pub symbols: Vec<String>,
    pub store_batch_size: usize,
    pub store_async_write: bool,
    pub database_url: String,
    pub max_range_secs: i64,
    pub flush_on_shutdown: bool,
    pub shutdown_drain_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let ring_buffer_size = env_parse("RING_BUFFER_SIZE", 8192)?;
        let ring_buffer_wait_strategy = env::var("RING_BUFFER_WAIT_STRATEGY")
            .unwrap_or_else(|_| "yielding".to_string())
            .parse()
            .context("RING_BUFFER_WAIT_STRATEGY")?;

        let late_event_tolerance_ms = env_parse("LATE_EVENT_TOLERANCE_MS", 5_000)?;

        let circuit_breaker_failure_rate = env_parse("CIRCUIT_BREAKER_FAILURE_RATE", 0.5)?;
        let circuit_breaker_open_duration_ms =
            env_parse("CIRCUIT_BREAKER_OPEN_DURATION_MS", 30_000)?;
        let circuit_breaker_half_open_trials =
            env_parse("CIRCUIT_BREAKER_HALF_OPEN_TRIALS", 3)?;

        let symbols_str = env::var("SYMBOLS").unwrap_or_else(|_| "BTCUSD,ETHUSD".to_string());
        let symbols: Vec<String> = symbols_str
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let store_batch_size = env_parse("STORE_BATCH_SIZE", 1)?;
        let store_async_write = env_parse("STORE_ASYNC_WRITE", false)?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/candles.db".to_string());

        let max_range_secs = env_parse("MAX_RANGE_SECS", 604_800)?;
        let flush_on_shutdown = env_parse("FLUSH_ON_SHUTDOWN", true)?;
        let shutdown_drain_timeout_ms = env_parse("SHUTDOWN_DRAIN_TIMEOUT_MS", 5_000)?;

        if ring_buffer_size == 0 || !ring_buffer_size.is_power_of_two() {
            bail!("RING_BUFFER_SIZE must be a positive power of two, got {ring_buffer_size}");
        }

        Ok(Self {
            ring_buffer_size,
            ring_buffer_wait_strategy,
            late_event_tolerance_ms,
            circuit_breaker_failure_rate,
            circuit_breaker_open_duration_ms,
            circuit_breaker_half_open_trials,
            symbols,
            store_batch_size,
            store_async_write,
            database_url,
            max_range_secs,
            flush_on_shutdown,
            shutdown_drain_timeout_ms,
        })
    }

    pub fn circuit_breaker_open_duration(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_open_duration_ms)
    }

    pub fn shutdown_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_drain_timeout_ms)
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}
