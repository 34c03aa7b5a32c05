//! Store error types.
//!
//! This module defines the error types that can occur while talking to
//! Elasticsearch or InfluxDB.

use thiserror::Error;

/// Errors that can occur during store client operations.
///
/// Every variant is fatal to the call that produced it. Per-item failures
/// reported inside a successful bulk response are not represented here;
/// they are logged and counted in the write summary instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The liveness probe failed while creating the client.
    #[error("Construction error: {0}")]
    ConstructionError(String),

    /// The backend answered with a non-success status code.
    #[error("Request failed with status {status}: {body}")]
    StatusError { status: u16, body: String },

    /// The request never produced a response (unreachable host, timeout).
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A success response did not carry the expected JSON body.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Caller supplied arguments are invalid or conflict with each other.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A record could not be serialized for the wire.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StoreError {
    /// Create a construction error.
    pub fn construction(msg: impl Into<String>) -> Self {
        Self::ConstructionError(msg.into())
    }

    /// Create a status error from a response.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::StatusError {
            status,
            body: body.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeError(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// The HTTP status carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::StatusError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
