//! # Bools Shared
//!
//! Plain data types used across the bools crates: the record shape handed
//! to and returned from the store clients, the decoded InfluxDB series
//! layout, and a small bounded worker pool.

pub mod pool;
pub mod record;
pub mod series;

pub use record::{is_missing, Record};
pub use series::{QueryResult, Series, StatementResult};
