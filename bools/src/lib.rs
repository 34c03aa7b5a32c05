//! # Bools
//!
//! Command line entry point for the Elasticsearch and InfluxDB clients.
//!
//! This crate wires the clients from the environment and provides the
//! JSON-lines reader used by the import commands.

pub mod config;
pub mod jsonl;

pub use config::Dependencies;

use bools_repository::StoreError;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Error, Debug)]
pub enum BoolsError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Store error.
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BoolsError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
