//! The dedicated consumer thread. One per process: drains the ring buffer
//! and hands every tick to the [`Aggregator`], applying the configured wait
//! strategy when the buffer runs dry.
//!
//! A standalone `std::thread` rather than a tokio task, because the spec's
//! pipeline needs a single predictable worker pinned to the hot loop rather
//! than a task competing for a shared scheduler — the same reasoning behind
//! the teacher's dedicated worker threads for its own hot loops. Since
//! [`Aggregator::on_tick`] still needs to await store/circuit-breaker calls
//! on rotation, the thread owns a single-threaded Tokio runtime of its own
//! and drives each tick through it; no work is ever parallelized across
//! ticks, so per-key ordering is preserved exactly as if the whole loop
//! were synchronous.

use super::aggregator::Aggregator;
use crate::config::WaitStrategy;
use crate::domain::market::store::CandleStore;
use crate::domain::market::tick::Tick;
use crate::infrastructure::ring_buffer::RingBuffer;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info};

pub struct Consumer;

impl Consumer {
    /// Spawns the consumer thread and returns its handle. `shutdown` is
    /// shared with whoever owns the pipeline's lifecycle (see
    /// [`crate::application::system::Application`]); setting it to `true`
    /// causes the loop to drain whatever remains and exit.
    pub fn spawn<S>(
        ring: Arc<RingBuffer>,
        aggregator: Arc<Aggregator<S>>,
        wait_strategy: WaitStrategy,
        shutdown: Arc<AtomicBool>,
    ) -> JoinHandle<()>
    where
        S: CandleStore + 'static,
    {
        std::thread::Builder::new()
            .name("candle-consumer".to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build consumer-thread runtime");

                loop {
                    match ring.try_consume() {
                        Some(tick) => process_tick(&rt, &aggregator, tick),
                        None => {
                            if shutdown.load(Ordering::Acquire) {
                                break;
                            }
                            idle(wait_strategy);
                        }
                    }
                }

                let mut drained = 0u64;
                while let Some(tick) = ring.try_consume() {
                    process_tick(&rt, &aggregator, tick);
                    drained += 1;
                }
                info!(drained, "consumer thread drained remaining ticks and exited");
            })
            .expect("failed to spawn consumer thread")
    }
}

/// Drives a single tick through the aggregator, catching any panic so it
/// never escapes the consumer thread (spec.md §7: "no panic may escape the
/// consumer thread"). A caught panic — e.g. a poisoned lock from a prior
/// unwind — is counted via `aggregator_errors_total` and the loop continues
/// with the next tick instead of taking the sole consumer thread down.
fn process_tick<S>(rt: &tokio::runtime::Runtime, aggregator: &Arc<Aggregator<S>>, tick: Tick)
where
    S: CandleStore + 'static,
{
    let result = panic::catch_unwind(AssertUnwindSafe(|| rt.block_on(aggregator.on_tick(tick))));
    if let Err(payload) = result {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(panic = %message, "caught panic while processing a tick; continuing");
        aggregator.record_caught_panic();
    }
}

fn idle(strategy: WaitStrategy) {
    match strategy {
        WaitStrategy::Yielding => std::thread::yield_now(),
        WaitStrategy::BusySpin => std::hint::spin_loop(),
        WaitStrategy::Park => std::thread::sleep(Duration::from_micros(200)),
    }
}
