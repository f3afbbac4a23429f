pub mod aggregator;
pub mod csv_log;
pub mod error;
pub mod listener;
pub mod reading;
pub mod wire;
