//! Pipeline bootstrap and shutdown, the `Application` facade a binary talks
//! to. Grounded on the teacher's `application/system/shutdown_service.rs`
//! pattern of a join handle plus a signal flag owned by a small facade type,
//! simplified to this crate's single consumer thread instead of a fleet of
//! trading subsystems.

use crate::application::pipeline::{Aggregator, Consumer, Publisher};
use crate::application::query_service::QueryService;
use crate::config::Config;
use crate::infrastructure::core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::persistence::SqliteCandleStore;
use crate::infrastructure::ring_buffer::RingBuffer;
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::{info, warn};

/// Owns every long-lived piece of the running pipeline: the ring buffer,
/// the consumer thread, and the facades (`Publisher`, `QueryService`)
/// external callers use. `shutdown()` is idempotent.
pub struct Application {
    publisher: Publisher,
    query_service: Arc<QueryService<SqliteCandleStore>>,
    aggregator: Arc<Aggregator<SqliteCandleStore>>,
    consumer_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    shutdown_flag: Arc<AtomicBool>,
    shutdown_drain_timeout: std::time::Duration,
    flush_on_shutdown: bool,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self> {
        let metrics = Arc::new(Metrics::new()?);
        let store = Arc::new(SqliteCandleStore::connect(&config.database_url).await?);

        let breaker = Arc::new(CircuitBreaker::new(
            "candle_store",
            CircuitBreakerConfig {
                failure_rate_threshold: config.circuit_breaker_failure_rate,
                min_calls: 5,
                window_size: 20,
                open_duration: config.circuit_breaker_open_duration(),
                half_open_trial_calls: config.circuit_breaker_half_open_trials,
            },
            metrics.clone(),
        ));

        let ring = Arc::new(RingBuffer::new(config.ring_buffer_size));

        let aggregator = Arc::new(Aggregator::new(
            store.clone(),
            breaker.clone(),
            metrics.clone(),
            config.late_event_tolerance_ms,
            config.store_async_write,
        ));

        let publisher = Publisher::new(ring.clone(), metrics.clone());

        let query_service = Arc::new(QueryService::new(
            store,
            breaker,
            metrics,
            config.symbols.clone(),
            config.max_range_secs,
        ));

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let consumer_handle = Consumer::spawn(
            ring,
            aggregator.clone(),
            config.ring_buffer_wait_strategy,
            shutdown_flag.clone(),
        );

        info!(symbols = ?config.symbols, "candle aggregation pipeline started");

        Ok(Self {
            publisher,
            query_service,
            aggregator,
            consumer_handle: std::sync::Mutex::new(Some(consumer_handle)),
            shutdown_flag,
            shutdown_drain_timeout: config.shutdown_drain_timeout(),
            flush_on_shutdown: config.flush_on_shutdown,
        })
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn query_service(&self) -> Arc<QueryService<SqliteCandleStore>> {
        self.query_service.clone()
    }

    /// Signals the consumer thread to drain and exit, then joins it with a
    /// bounded timeout. Safe to call more than once; the second call is a
    /// no-op because the handle has already been taken.
    pub fn shutdown(&self) {
        let handle = {
            let mut guard = self.consumer_handle.lock().unwrap();
            guard.take()
        };

        let Some(handle) = handle else {
            return;
        };

        self.shutdown_flag.store(true, Ordering::Release);

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(handle.join());
        });

        match rx.recv_timeout(self.shutdown_drain_timeout) {
            Ok(Ok(())) => info!("consumer thread shut down cleanly"),
            Ok(Err(_)) => warn!("consumer thread panicked during shutdown"),
            Err(_) => warn!("consumer thread did not shut down within the configured drain timeout"),
        }

        if self.flush_on_shutdown {
            self.flush_live_candles();
        }
    }

    /// Persists every in-progress candle still sitting in `ActiveMap`. Runs
    /// the async flush on a throwaway single-threaded runtime owned by a
    /// dedicated OS thread, the same trick the consumer thread uses — doing
    /// this on the calling thread directly would panic if `shutdown` is
    /// itself invoked from inside a tokio runtime (e.g. via `Drop`).
    fn flush_live_candles(&self) {
        let aggregator = self.aggregator.clone();
        let joined = std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build shutdown-flush runtime");
            rt.block_on(aggregator.flush_all());
        })
        .join();

        match joined {
            Ok(()) => info!("flushed live candles on shutdown"),
            Err(_) => warn!("shutdown flush thread panicked"),
        }
    }

    pub fn aggregator(&self) -> Arc<Aggregator<SqliteCandleStore>> {
        self.aggregator.clone()
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        self.shutdown();
    }
}
