pub mod candle;
pub mod store;
pub mod tick;
pub mod time_grid;

pub use candle::Candle;
pub use store::{CandleStore, StoreError};
pub use tick::Tick;
pub use time_grid::Interval;
