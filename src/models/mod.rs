pub mod stock_counters;

pub use stock_counters::{CounterError, ReplayFailure, StockCounters, StockDelta};
