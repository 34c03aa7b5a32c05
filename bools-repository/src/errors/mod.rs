//! Error types for the store clients.

mod store_error;

pub use store_error::StoreError;
