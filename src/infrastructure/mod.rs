pub mod core;
pub mod observability;
pub mod persistence;
pub mod ring_buffer;

pub use ring_buffer::{PublishOutcome, RingBuffer};
