//! Prometheus metrics surface for the pipeline.
//!
//! All metrics use the `candle_aggregator_` prefix. This module only owns
//! the registry and the typed handles; whatever external process scrapes
//! or pushes them (a Prometheus exporter, a pushgateway client) is an
//! out-of-scope collaborator.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    pub events_processed_total: IntCounter,
    pub candles_completed_total: IntCounter,
    pub late_events_dropped_total: IntCounter,
    pub aggregator_errors_total: IntCounter,
    pub persist_skipped_total: IntCounter,
    pub bad_tick_total: IntCounter,
    pub ring_buffer_events_dropped_total: IntCounter,
    pub circuit_breaker_transitions_total: IntCounterVec,
    pub tick_processing_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_processed_total = IntCounter::with_opts(Opts::new(
            "candle_aggregator_events_processed_total",
            "Total ticks handed to the aggregator",
        ))?;
        registry.register(Box::new(events_processed_total.clone()))?;

        let candles_completed_total = IntCounter::with_opts(Opts::new(
            "candle_aggregator_candles_completed_total",
            "Total candles rotated out and persisted",
        ))?;
        registry.register(Box::new(candles_completed_total.clone()))?;

        let late_events_dropped_total = IntCounter::with_opts(Opts::new(
            "candle_aggregator_late_events_dropped_total",
            "Total late ticks dropped for exceeding the tolerance window",
        ))?;
        registry.register(Box::new(late_events_dropped_total.clone()))?;

        let aggregator_errors_total = IntCounter::with_opts(Opts::new(
            "candle_aggregator_aggregator_errors_total",
            "Total unexpected errors recovered from inside the consumer loop",
        ))?;
        registry.register(Box::new(aggregator_errors_total.clone()))?;

        let persist_skipped_total = IntCounter::with_opts(Opts::new(
            "candle_aggregator_persist_skipped_total",
            "Total rotations where persistence was skipped because the circuit breaker was open",
        ))?;
        registry.register(Box::new(persist_skipped_total.clone()))?;

        let bad_tick_total = IntCounter::with_opts(Opts::new(
            "candle_aggregator_bad_tick_total",
            "Total ticks rejected by validation before reaching the ring buffer",
        ))?;
        registry.register(Box::new(bad_tick_total.clone()))?;

        let ring_buffer_events_dropped_total = IntCounter::with_opts(Opts::new(
            "candle_aggregator_ring_buffer_events_dropped_total",
            "Total ticks dropped because the ring buffer was full",
        ))?;
        registry.register(Box::new(ring_buffer_events_dropped_total.clone()))?;

        let circuit_breaker_transitions_total = IntCounterVec::new(
            Opts::new(
                "candle_aggregator_circuit_breaker_transitions_total",
                "Total circuit breaker state transitions, by destination state",
            ),
            &["to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions_total.clone()))?;

        let tick_processing_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "candle_aggregator_tick_processing_seconds",
                "Per-tick aggregator processing latency",
            )
            .buckets(vec![
                0.000_001, 0.000_005, 0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01,
            ]),
        )?;
        registry.register(Box::new(tick_processing_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            events_processed_total,
            candles_completed_total,
            late_events_dropped_total,
            aggregator_errors_total,
            persist_skipped_total,
            bad_tick_total,
            ring_buffer_events_dropped_total,
            circuit_breaker_transitions_total,
            tick_processing_seconds,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let m = Metrics::new().unwrap();
        assert_eq!(m.events_processed_total.get(), 0);
        m.events_processed_total.inc();
        assert_eq!(m.events_processed_total.get(), 1);
    }

    #[test]
    fn registry_exposes_all_registered_metrics() {
        let m = Metrics::new().unwrap();
        let families = m.registry().gather();
        assert!(families.len() >= 8);
    }
}
