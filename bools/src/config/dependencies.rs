//! Dependency initialization and wiring for the command line.

use std::env;
use std::sync::Arc;

use tracing::info;

use crate::BoolsError;
use bools_repository::config::{DEFAULT_ELASTICSEARCH_PORT, DEFAULT_INFLUXDB_PORT};
use bools_repository::elasticsearch::DEFAULT_DOC_TYPE;
use bools_repository::transport::TransportOptions;
use bools_repository::{
    ConnectionConfig, ElasticsearchClient, HttpTransport, InfluxDbClient, ReqwestTransport,
};

/// Environment prefix for Elasticsearch settings.
pub const ELASTICSEARCH_PREFIX: &str = "ES";

/// Environment prefix for InfluxDB settings.
pub const INFLUXDB_PREFIX: &str = "INFLUXDB";

/// Settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub elasticsearch: ConnectionConfig,
    pub doc_type: String,
    pub influxdb: ConnectionConfig,
    pub database: Option<String>,
    pub accept_invalid_certs: bool,
}

impl Settings {
    /// Read settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ES_HOST`, `ES_PORT`, ... (see [`ConnectionConfig::from_env`])
    /// - `ES_DOC_TYPE`: Document type for version 6 and older (default: _doc)
    /// - `INFLUXDB_HOST`, `INFLUXDB_PORT`, ...
    /// - `INFLUXDB_DATABASE`: Default database (default: none)
    /// - `ACCEPT_INVALID_CERTS`: Skip TLS verification (default: true)
    pub fn from_env() -> Result<Self, BoolsError> {
        let accept_invalid_certs = match env::var("ACCEPT_INVALID_CERTS") {
            Ok(value) => parse_flag(&value).ok_or_else(|| {
                BoolsError::config(format!("Invalid ACCEPT_INVALID_CERTS: {}", value))
            })?,
            Err(_) => TransportOptions::default().accept_invalid_certs,
        };

        Ok(Self {
            elasticsearch: ConnectionConfig::from_env(
                ELASTICSEARCH_PREFIX,
                DEFAULT_ELASTICSEARCH_PORT,
            )?,
            doc_type: env::var("ES_DOC_TYPE").unwrap_or_else(|_| DEFAULT_DOC_TYPE.to_string()),
            influxdb: ConnectionConfig::from_env(INFLUXDB_PREFIX, DEFAULT_INFLUXDB_PORT)?,
            database: env::var("INFLUXDB_DATABASE").ok().filter(|db| !db.is_empty()),
            accept_invalid_certs,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Container for the shared transport and the settings used to build clients.
pub struct Dependencies {
    transport: Arc<dyn HttpTransport>,
    settings: Settings,
}

impl Dependencies {
    /// Initialize dependencies from `.env` and the environment.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(BoolsError)` - If the settings or the HTTP client are invalid
    pub fn new() -> Result<Self, BoolsError> {
        dotenv::dotenv().ok();
        let settings = Settings::from_env()?;

        info!(
            elasticsearch_host = %settings.elasticsearch.host,
            elasticsearch_port = settings.elasticsearch.port,
            influxdb_host = %settings.influxdb.host,
            influxdb_port = settings.influxdb.port,
            "Initializing dependencies"
        );

        let transport = ReqwestTransport::with_options(TransportOptions {
            accept_invalid_certs: settings.accept_invalid_certs,
        })?;

        Ok(Self {
            transport: Arc::new(transport),
            settings,
        })
    }

    /// Connect to Elasticsearch.
    pub async fn elasticsearch(&self) -> Result<ElasticsearchClient, BoolsError> {
        let client = ElasticsearchClient::connect_with_type(
            self.transport.clone(),
            &self.settings.elasticsearch,
            self.settings.doc_type.as_str(),
        )
        .await?;
        Ok(client)
    }

    /// Connect to InfluxDB.
    pub async fn influxdb(&self) -> Result<InfluxDbClient, BoolsError> {
        let client = InfluxDbClient::connect(
            self.transport.clone(),
            &self.settings.influxdb,
            self.settings.database.clone(),
        )
        .await?;
        Ok(client)
    }
}
