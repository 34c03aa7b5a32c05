//! Store client trait definition.
//!
//! This module defines the capability both backend clients share, so code
//! that only needs connection level facts (health, version, address) can
//! hold either one behind a `dyn StoreClient`.

use std::fmt;

use async_trait::async_trait;

use crate::errors::StoreError;

/// The supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Elasticsearch,
    InfluxDb,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Elasticsearch => f.write_str("elasticsearch"),
            Backend::InfluxDb => f.write_str("influxdb"),
        }
    }
}

/// Abstract interface over a connected store client.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across async tasks.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Which backend this client talks to.
    fn backend(&self) -> Backend;

    /// The resolved base URL. May carry credentials; do not log it.
    fn base_url(&self) -> &str;

    /// The backend major version detected at construction.
    fn version(&self) -> u32;

    /// Check if the backend is reachable and answering its liveness probe.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The probe answered with a success status
    /// * `Ok(false)` - The probe answered with an error status
    /// * `Err(StoreError)` - The probe could not be sent
    async fn health_check(&self) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_display() {
        assert_eq!(Backend::Elasticsearch.to_string(), "elasticsearch");
        assert_eq!(Backend::InfluxDb.to_string(), "influxdb");
    }
}
