//! Configuration types for the store clients.

use std::env;
use std::time::Duration;

use url::Url;

use crate::errors::StoreError;

/// Default Elasticsearch HTTP port.
pub const DEFAULT_ELASTICSEARCH_PORT: u16 = 9200;

/// Default InfluxDB HTTP port.
pub const DEFAULT_INFLUXDB_PORT: u16 = 8086;

/// Default timeout applied to every request, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Connection settings shared by both backends.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// URL scheme, `http` or `https`.
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Known major version of the backend.
    /// When set, the liveness probe is skipped entirely.
    pub version: Option<u32>,
    /// Per request timeout used when an operation does not specify one.
    pub timeout: Duration,
}

impl ConnectionConfig {
    /// Create a config for the given host and port with default settings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "http".to_string(),
            host: host.into(),
            port,
            user: None,
            password: None,
            version: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Local Elasticsearch defaults.
    pub fn elasticsearch() -> Self {
        Self::new("localhost", DEFAULT_ELASTICSEARCH_PORT)
    }

    /// Local InfluxDB defaults.
    pub fn influxdb() -> Self {
        Self::new("localhost", DEFAULT_INFLUXDB_PORT)
    }

    /// Set basic auth credentials.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Set the scheme.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Pin the backend major version and skip the liveness probe.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the default request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read settings from `{PREFIX}_*` environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `{PREFIX}_HOST` (default: localhost)
    /// - `{PREFIX}_PORT` (default: `default_port`)
    /// - `{PREFIX}_SCHEME` (default: http)
    /// - `{PREFIX}_USER` / `{PREFIX}_PASSWORD` (default: none)
    /// - `{PREFIX}_VERSION` (default: detected by probe)
    /// - `{PREFIX}_TIMEOUT_SECS` (default: 180)
    pub fn from_env(prefix: &str, default_port: u16) -> Result<Self, StoreError> {
        let var = |name: &str| env::var(format!("{}_{}", prefix, name)).ok();

        let mut config = Self::new(
            var("HOST").unwrap_or_else(|| "localhost".to_string()),
            default_port,
        );

        if let Some(port) = var("PORT") {
            config.port = port
                .parse()
                .map_err(|e| StoreError::validation(format!("Invalid {}_PORT: {}", prefix, e)))?;
        }
        if let Some(scheme) = var("SCHEME") {
            config.scheme = scheme;
        }
        config.user = var("USER");
        config.password = var("PASSWORD");
        if let Some(version) = var("VERSION") {
            config.version = Some(version.parse().map_err(|e| {
                StoreError::validation(format!("Invalid {}_VERSION: {}", prefix, e))
            })?);
        }
        if let Some(timeout) = var("TIMEOUT_SECS") {
            let secs: u64 = timeout.parse().map_err(|e| {
                StoreError::validation(format!("Invalid {}_TIMEOUT_SECS: {}", prefix, e))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Build the base URL, `scheme://[user:password@]host:port`.
    ///
    /// Credentials are percent-encoded. The returned string has no trailing
    /// slash so paths can be appended directly.
    pub fn base_url(&self) -> Result<String, StoreError> {
        let mut url = Url::parse(&format!("{}://{}:{}", self.scheme, self.host, self.port))
            .map_err(|e| StoreError::validation(format!("Invalid host or scheme: {}", e)))?;

        if let Some(ref user) = self.user {
            url.set_username(user)
                .map_err(|_| StoreError::validation("Cannot set username on this URL"))?;
            url.set_password(self.password.as_deref())
                .map_err(|_| StoreError::validation("Cannot set password on this URL"))?;
        }

        Ok(url.as_str().trim_end_matches('/').to_string())
    }
}
