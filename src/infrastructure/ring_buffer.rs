//! Bounded SPSC lock-free ring buffer of ticks.
//!
//! Single producer, single consumer. Each slot carries its own sequence tag
//! (the classic Vyukov bounded-queue protocol) rather than relying solely on
//! a pair of cursors: the producer may only publish into a slot whose tag
//! equals the slot's target sequence, and the consumer may only read a slot
//! whose tag equals `seq + 1`. This makes full/empty detection local to the
//! slot being touched instead of requiring a second cross-core read of the
//! other side's cursor on every operation.
//!
//! Cursors are cache-line padded to avoid false sharing between the
//! producer and consumer, the same concern the ring-buffer implementations
//! in the wider ecosystem (LMAX Disruptor-style Rust ports) pad for.

use crate::domain::market::tick::Tick;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of a non-blocking publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    Dropped,
}

struct Slot {
    sequence: AtomicU64,
    value: UnsafeCell<Tick>,
}

/// A bounded single-producer/single-consumer queue of [`Tick`]s.
///
/// `capacity` must be a power of two. Back-pressure is handled by explicit,
/// counted loss (`try_publish` returning [`PublishOutcome::Dropped`]) — the
/// producer is never blocked or made to spin.
pub struct RingBuffer {
    mask: usize,
    buffer: Box<[Slot]>,
    producer_seq: CachePadded<AtomicU64>,
    consumer_seq: CachePadded<AtomicU64>,
}

// SAFETY: `Slot::value` is written exactly once by the producer between
// claiming and publishing a sequence, and read exactly once by the
// consumer between observing the published tag and advancing its own
// cursor. The sequence-tag protocol below establishes the happens-before
// edges (Release publish / Acquire read) that make this safe across
// threads even though `Tick` itself carries no synchronization.
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Default capacity when the pipeline is not otherwise configured.
    pub const DEFAULT_CAPACITY: usize = 8192;

    /// Creates a new ring buffer. `capacity` must be a power of two;
    /// non-power-of-two values are rounded up.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity {
            slots.push(Slot {
                sequence: AtomicU64::new(i as u64),
                value: UnsafeCell::new(Tick::default()),
            });
        }
        Self {
            mask: capacity - 1,
            buffer: slots.into_boxed_slice(),
            producer_seq: CachePadded::new(AtomicU64::new(0)),
            consumer_seq: CachePadded::new(AtomicU64::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Producer-side, non-blocking. Never spins, never panics.
    pub fn try_publish(&self, tick: Tick) -> PublishOutcome {
        let seq = self.producer_seq.load(Ordering::Relaxed);
        let slot = &self.buffer[seq as usize & self.mask];

        // The slot is available to the producer only once the consumer has
        // drained the previous lap's value out of it, i.e. once its tag
        // equals `seq` exactly.
        if slot.sequence.load(Ordering::Acquire) != seq {
            return PublishOutcome::Dropped;
        }

        // SAFETY: we are the only producer and we've confirmed (above) that
        // the consumer is done reading this slot's previous value.
        unsafe {
            *slot.value.get() = tick;
        }
        slot.sequence.store(seq + 1, Ordering::Release);
        self.producer_seq.store(seq + 1, Ordering::Relaxed);
        PublishOutcome::Published
    }

    /// Consumer-side, non-blocking. Single consumer only.
    pub fn try_consume(&self) -> Option<Tick> {
        let seq = self.consumer_seq.load(Ordering::Relaxed);
        let slot = &self.buffer[seq as usize & self.mask];

        // The slot is readable only once the producer has published at
        // exactly this sequence, i.e. its tag equals `seq + 1`.
        if slot.sequence.load(Ordering::Acquire) != seq + 1 {
            return None;
        }

        // SAFETY: we are the only consumer and the Acquire load above
        // synchronizes with the producer's Release publish, so the value
        // write is visible here.
        let tick = unsafe { *slot.value.get() };
        slot.sequence
            .store(seq.wrapping_add(self.capacity() as u64), Ordering::Release);
        self.consumer_seq.store(seq + 1, Ordering::Relaxed);
        Some(tick)
    }

    /// Approximate occupancy; racy by construction (both cursors may move
    /// between the two loads), intended for metrics/backoff decisions only.
    pub fn len(&self) -> usize {
        let p = self.producer_seq.load(Ordering::Relaxed);
        let c = self.consumer_seq.load(Ordering::Relaxed);
        p.saturating_sub(c) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(ts: i64) -> Tick {
        Tick::new("BTCUSD", 100.0, 101.0, ts)
    }

    #[test]
    fn publish_then_consume_round_trips() {
        let rb = RingBuffer::new(4);
        assert_eq!(rb.try_publish(tick(1)), PublishOutcome::Published);
        let got = rb.try_consume().unwrap();
        assert_eq!(got.ts_ms, 1);
        assert!(rb.try_consume().is_none());
    }

    #[test]
    fn fifo_ordering_is_preserved() {
        let rb = RingBuffer::new(8);
        for i in 1..=5 {
            assert_eq!(rb.try_publish(tick(i)), PublishOutcome::Published);
        }
        for i in 1..=5 {
            assert_eq!(rb.try_consume().unwrap().ts_ms, i);
        }
    }

    #[test]
    fn back_pressure_drops_when_full() {
        // scenario 5: capacity 4, publish 10 without consuming.
        let rb = RingBuffer::new(4);
        let mut published = 0;
        let mut dropped = 0;
        for i in 1..=10 {
            match rb.try_publish(tick(i)) {
                PublishOutcome::Published => published += 1,
                PublishOutcome::Dropped => dropped += 1,
            }
        }
        assert_eq!(published, 4);
        assert_eq!(dropped, 6);
    }

    #[test]
    fn exactly_full_rejects_next_publish() {
        let rb = RingBuffer::new(4);
        for i in 1..=4 {
            assert_eq!(rb.try_publish(tick(i)), PublishOutcome::Published);
        }
        assert_eq!(rb.try_publish(tick(5)), PublishOutcome::Dropped);
    }

    #[test]
    fn slot_is_reusable_after_drain() {
        let rb = RingBuffer::new(2);
        for i in 1..=2 {
            rb.try_publish(tick(i));
        }
        assert_eq!(rb.try_publish(tick(3)), PublishOutcome::Dropped);
        rb.try_consume();
        assert_eq!(rb.try_publish(tick(3)), PublishOutcome::Published);
        assert_eq!(rb.try_consume().unwrap().ts_ms, 2);
        assert_eq!(rb.try_consume().unwrap().ts_ms, 3);
    }

    #[test]
    fn non_power_of_two_capacity_rounds_up() {
        let rb = RingBuffer::new(10);
        assert_eq!(rb.capacity(), 16);
    }

    #[test]
    fn concurrent_producer_and_consumer_preserve_fifo() {
        use std::sync::Arc;
        use std::thread;

        let rb = Arc::new(RingBuffer::new(64));
        let producer = {
            let rb = rb.clone();
            thread::spawn(move || {
                let mut i = 1;
                while i <= 10_000 {
                    if rb.try_publish(tick(i)) == PublishOutcome::Published {
                        i += 1;
                    } else {
                        std::thread::yield_now();
                    }
                }
            })
        };

        let consumer = {
            let rb = rb.clone();
            thread::spawn(move || {
                let mut expected = 1;
                while expected <= 10_000 {
                    if let Some(t) = rb.try_consume() {
                        assert_eq!(t.ts_ms, expected);
                        expected += 1;
                    } else {
                        std::thread::yield_now();
                    }
                }
            })
        };

        producer.join().unwrap();
        consumer.join().unwrap();
    }
}
