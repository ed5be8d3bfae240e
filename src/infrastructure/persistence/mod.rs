pub mod in_memory_candle_store;
pub mod sqlite_candle_store;

pub use in_memory_candle_store::InMemoryCandleStore;
pub use sqlite_candle_store::SqliteCandleStore;
