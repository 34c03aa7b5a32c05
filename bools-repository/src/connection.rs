//! Connection shared by both backend clients.
//!
//! A [`Connection`] owns the injected transport, the resolved base URL and
//! the backend major version detected by the liveness probe. It is built
//! once per client and never mutated afterwards.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::ConnectionConfig;
use crate::errors::StoreError;
use crate::interfaces::{Backend, HttpRequest, HttpResponse, HttpTransport};

/// How a backend is probed for liveness and version.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Probe {
    /// Path appended to the base URL, empty for the root.
    pub path: &'static str,
    /// Pulls the raw version string out of the probe body.
    pub version_field: fn(&Value) -> Option<&str>,
}

/// Parse the major component of a version string such as `7.10.2` or `v1.8.10`.
pub fn parse_major_version(raw: &str) -> Option<u32> {
    let raw = raw.trim().trim_start_matches(['v', 'V']);
    let major: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    major.parse().ok()
}

/// Decode a response under the shared contract.
///
/// A 2xx status with a JSON body is decoded; any other status becomes
/// `StatusError` carrying the raw body; a 2xx status with a non-JSON body
/// becomes `DecodeError`.
pub fn decode_json(response: HttpResponse) -> Result<Value, StoreError> {
    let response = expect_success(response)?;
    serde_json::from_str(&response.body).map_err(|e| {
        StoreError::decode(format!("Response is not JSON ({}): {}", e, response.body))
    })
}

/// Reject any response whose status is outside the 2xx range.
pub fn expect_success(response: HttpResponse) -> Result<HttpResponse, StoreError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(StoreError::status(response.status, response.body))
    }
}

/// Resolved connection to a backend.
#[derive(Clone)]
pub struct Connection {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    version: u32,
    timeout: Duration,
    probe_path: &'static str,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("version", &self.version)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Resolve the base URL and, unless the version is pinned, probe the
    /// backend for liveness and version.
    ///
    /// # Returns
    ///
    /// * `Ok(Connection)` - The probe succeeded or was skipped
    /// * `Err(StoreError::ConstructionError)` - The probe was unreachable,
    ///   answered non-2xx, or carried no parsable version
    pub(crate) async fn establish(
        transport: Arc<dyn HttpTransport>,
        config: &ConnectionConfig,
        backend: Backend,
        probe: Probe,
    ) -> Result<Self, StoreError> {
        let base_url = config.base_url()?;

        let version = match config.version {
            Some(version) => version,
            None => Self::probe(transport.as_ref(), &base_url, probe, config.timeout).await?,
        };

        info!(
            backend = %backend,
            host = %config.host,
            port = config.port,
            version = version,
            "Created store client"
        );

        Ok(Self {
            transport,
            base_url,
            version,
            timeout: config.timeout,
            probe_path: probe.path,
        })
    }

    async fn probe(
        transport: &dyn HttpTransport,
        base_url: &str,
        probe: Probe,
        timeout: Duration,
    ) -> Result<u32, StoreError> {
        let request = HttpRequest::get(format!("{}{}", base_url, probe.path)).timeout(timeout);

        let response = transport
            .send(request)
            .await
            .map_err(|e| StoreError::construction(format!("Liveness probe failed: {}", e)))?;

        if !response.is_success() {
            warn!(status = response.status, "Liveness probe rejected");
            return Err(StoreError::construction(format!(
                "Liveness probe returned status {}: {}",
                response.status, response.body
            )));
        }

        let body: Value = serde_json::from_str(&response.body).map_err(|e| {
            StoreError::construction(format!("Liveness probe body is not JSON: {}", e))
        })?;

        (probe.version_field)(&body)
            .and_then(parse_major_version)
            .ok_or_else(|| {
                StoreError::construction(format!(
                    "Cannot detect version from probe response: {}",
                    response.body
                ))
            })
    }

    /// The resolved base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The detected backend major version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The default request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Join a path onto the base URL. `path` should start with `/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request, applying the default timeout if none is set.
    pub async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, StoreError> {
        if request.timeout.is_none() {
            request.timeout = Some(self.timeout);
        }
        self.transport.send(request).await
    }

    /// Send a request and decode its JSON body under the shared contract.
    pub async fn send_json(&self, request: HttpRequest) -> Result<Value, StoreError> {
        decode_json(self.send(request).await?)
    }

    /// Send a request and only check that it succeeded.
    pub async fn send_checked(&self, request: HttpRequest) -> Result<HttpResponse, StoreError> {
        expect_success(self.send(request).await?)
    }

    /// Re-issue the liveness probe.
    pub async fn health_check(&self) -> Result<bool, StoreError> {
        let response = self.send(HttpRequest::get(self.url(self.probe_path))).await?;
        Ok(response.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use serde_json::json;

    fn version_field(body: &Value) -> Option<&str> {
        body.get("version").and_then(Value::as_str)
    }

    const TEST_PROBE: Probe = Probe {
        path: "/health",
        version_field,
    };

    #[test]
    fn test_parse_major_version() {
        assert_eq!(parse_major_version("7.10.2"), Some(7));
        assert_eq!(parse_major_version("6.8.0"), Some(6));
        assert_eq!(parse_major_version("v1.8.10"), Some(1));
        assert_eq!(parse_major_version("10.0.0"), Some(10));
        assert_eq!(parse_major_version("x"), None);
        assert_eq!(parse_major_version(""), None);
    }

    #[test]
    fn test_decode_json_contract() {
        let ok = decode_json(HttpResponse::new(200, r#"{"a":1}"#)).unwrap();
        assert_eq!(ok, json!({"a": 1}));

        let status = decode_json(HttpResponse::new(404, "missing")).unwrap_err();
        assert_eq!(status, StoreError::status(404, "missing"));

        let decode = decode_json(HttpResponse::new(200, "not json")).unwrap_err();
        assert!(matches!(decode, StoreError::DecodeError(_)));
    }

    #[tokio::test]
    async fn test_establish_probes_version() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_json(200, json!({"version": "1.8.10"}));

        let config = ConnectionConfig::new("influx", 8086);
        let connection = Connection::establish(
            transport.clone(),
            &config,
            Backend::InfluxDb,
            TEST_PROBE,
        )
        .await
        .unwrap();

        assert_eq!(connection.version(), 1);
        assert_eq!(connection.base_url(), "http://influx:8086");
        let requests = transport.requests();
        assert_eq!(requests[0].url, "http://influx:8086/health");
        assert_eq!(requests[0].timeout, Some(config.timeout));
    }

    #[tokio::test]
    async fn test_probe_500_is_construction_error() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(500, "down");

        let result = Connection::establish(
            transport.clone(),
            &ConnectionConfig::influxdb(),
            Backend::InfluxDb,
            TEST_PROBE,
        )
        .await;

        assert!(matches!(result, Err(StoreError::ConstructionError(_))));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_probe_unreachable_is_construction_error() {
        let transport = Arc::new(MockTransport::new());
        transport.fail(StoreError::connection("refused"));

        let result = Connection::establish(
            transport,
            &ConnectionConfig::influxdb(),
            Backend::InfluxDb,
            TEST_PROBE,
        )
        .await;

        assert!(matches!(result, Err(StoreError::ConstructionError(_))));
    }

    #[tokio::test]
    async fn test_probe_without_version_is_construction_error() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_json(200, json!({"status": "pass"}));

        let result = Connection::establish(
            transport,
            &ConnectionConfig::influxdb(),
            Backend::InfluxDb,
            TEST_PROBE,
        )
        .await;

        assert!(matches!(result, Err(StoreError::ConstructionError(_))));
    }

    #[tokio::test]
    async fn test_pinned_version_skips_probe() {
        let transport = Arc::new(MockTransport::new());

        let connection = Connection::establish(
            transport.clone(),
            &ConnectionConfig::influxdb().with_version(2),
            Backend::InfluxDb,
            TEST_PROBE,
        )
        .await
        .unwrap();

        assert_eq!(connection.version(), 2);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_health_check() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(200, "{}").respond(503, "busy");

        let connection = Connection::establish(
            transport.clone(),
            &ConnectionConfig::influxdb().with_version(1),
            Backend::InfluxDb,
            TEST_PROBE,
        )
        .await
        .unwrap();

        assert!(connection.health_check().await.unwrap());
        assert!(!connection.health_check().await.unwrap());
    }
}
