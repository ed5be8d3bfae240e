//! Producer-side entry point into the pipeline. Owned by whatever feeds
//! market data in (a websocket client, a replay harness, a test) — exactly
//! one call site per process, mirroring the ring buffer's single-producer
//! contract.

use crate::domain::market::tick::Tick;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::ring_buffer::{PublishOutcome, RingBuffer};
use std::sync::Arc;

pub struct Publisher {
    ring: Arc<RingBuffer>,
    metrics: Arc<Metrics>,
}

impl Publisher {
    pub fn new(ring: Arc<RingBuffer>, metrics: Arc<Metrics>) -> Self {
        Self { ring, metrics }
    }

    /// Validates and publishes a tick. Invalid ticks never reach the ring
    /// buffer; full-buffer drops are counted separately so the two failure
    /// modes (bad input vs. back-pressure) stay distinguishable in metrics.
    pub fn publish(&self, tick: Tick) {
        if !tick.is_valid() {
            self.metrics.bad_tick_total.inc();
            return;
        }

        if self.ring.try_publish(tick) == PublishOutcome::Dropped {
            self.metrics.ring_buffer_events_dropped_total.inc();
        }
    }
}
