//! InfluxDB client implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::batch::{chunks, WriteOptions, WriteSummary};
use crate::config::ConnectionConfig;
use crate::connection::{expect_success, Connection, Probe};
use crate::errors::StoreError;
use crate::influxdb::line_protocol::{Point, Precision};
use crate::interfaces::{Backend, HttpRequest, HttpTransport, StoreClient};
use bools_shared::QueryResult;

/// Default number of rows per streamed query chunk.
pub const DEFAULT_QUERY_CHUNK_SIZE: usize = 10_000;

fn version_field(body: &Value) -> Option<&str> {
    body.get("version")?.as_str()
}

const INFLUXDB_PROBE: Probe = Probe {
    path: "/health",
    version_field,
};

/// Quote an identifier for InfluxQL, escaping embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

/// InfluxDB client.
///
/// # Example
///
/// ```ignore
/// let transport = Arc::new(ReqwestTransport::new()?);
/// let config = ConnectionConfig::influxdb();
/// let client = InfluxDbClient::connect(transport, &config, Some("metrics".to_string())).await?;
///
/// client.write(lines, None, Precision::Nanoseconds, &WriteOptions::default()).await?;
/// let result = client.query("SELECT * FROM cpu", None, DEFAULT_QUERY_CHUNK_SIZE, None).await?;
/// ```
#[derive(Debug, Clone)]
pub struct InfluxDbClient {
    connection: Connection,
    database: Option<String>,
}

impl InfluxDbClient {
    /// Connect to InfluxDB, optionally with a default database.
    ///
    /// # Returns
    ///
    /// * `Ok(InfluxDbClient)` - The server answered `/health`
    /// * `Err(StoreError::ConstructionError)` - The probe failed
    pub async fn connect(
        transport: Arc<dyn HttpTransport>,
        config: &ConnectionConfig,
        database: Option<String>,
    ) -> Result<Self, StoreError> {
        let connection =
            Connection::establish(transport, config, Backend::InfluxDb, INFLUXDB_PROBE).await?;

        Ok(Self {
            connection,
            database,
        })
    }

    /// The default database, if any.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Pick the explicit database, falling back to the client default.
    fn resolve_database<'a>(&'a self, database: Option<&'a str>) -> Result<&'a str, StoreError> {
        database.or(self.database.as_deref()).ok_or_else(|| {
            StoreError::validation("database must be given either at construction or per call")
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<String, StoreError> {
        let url = Url::parse_with_params(&self.connection.url(path), params)
            .map_err(|e| StoreError::validation(format!("Invalid request URL: {}", e)))?;
        Ok(url.to_string())
    }

    /// Run an InfluxQL query with chunked streaming enabled.
    ///
    /// The server answers with one JSON document per chunk, separated by
    /// newlines, all within a single response. They are decoded in order and
    /// merged into one result. Statement level errors are left in the result
    /// for the caller to inspect.
    #[instrument(skip(self, timeout))]
    pub async fn query(
        &self,
        influxql: &str,
        database: Option<&str>,
        chunk_size: usize,
        timeout: Option<Duration>,
    ) -> Result<QueryResult, StoreError> {
        let database = self.resolve_database(database)?;
        let chunk_size = chunk_size.max(1).to_string();
        let url = self.endpoint(
            "/query",
            &[
                ("db", database),
                ("pretty", "false"),
                ("chunked", "true"),
                ("chunk_size", chunk_size.as_str()),
                ("q", influxql),
            ],
        )?;

        let mut request = HttpRequest::get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = expect_success(self.connection.send(request).await?)?;

        decode_chunks(&response.body)
    }

    /// Write line protocol points to `database`, `batch_size` lines per request.
    ///
    /// Chunks are sent strictly in order. A non-2xx answer aborts the call;
    /// earlier chunks stay written.
    #[instrument(skip(self, lines, options), fields(batch_size = options.batch_size))]
    pub async fn write<I, L>(
        &self,
        lines: I,
        database: Option<&str>,
        precision: Precision,
        options: &WriteOptions,
    ) -> Result<WriteSummary, StoreError>
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        let database = self.resolve_database(database)?;
        let batches = chunks(lines.into_iter().map(Into::into), options.batch_size)?;
        let url = self.endpoint("/write", &[("db", database), ("precision", precision.as_str())])?;

        let mut summary = WriteSummary::default();
        for chunk in batches {
            let count = chunk.len();
            let mut request = HttpRequest::post(url.as_str()).text_body(chunk.join("\n"));
            if let Some(timeout) = options.timeout {
                request = request.timeout(timeout);
            }

            self.connection.send_checked(request).await?;
            summary.chunks += 1;
            summary.records += count;
            debug!(chunk = summary.chunks, points = count, "Write chunk accepted");
        }

        Ok(summary)
    }

    /// Render and write points at nanosecond precision.
    ///
    /// Every point is rendered before the first request, so a point without
    /// fields fails the call without touching the server.
    pub async fn write_points<I>(
        &self,
        points: I,
        database: Option<&str>,
        options: &WriteOptions,
    ) -> Result<WriteSummary, StoreError>
    where
        I: IntoIterator<Item = Point>,
    {
        let lines = points
            .into_iter()
            .map(|point| point.to_line())
            .collect::<Result<Vec<String>, StoreError>>()?;

        self.write(lines, database, Precision::Nanoseconds, options)
            .await
    }

    /// Execute a state changing statement through `POST /query`.
    pub async fn action(&self, influxql: &str, database: Option<&str>) -> Result<(), StoreError> {
        let url = match database {
            Some(database) => self.endpoint("/query", &[("db", database), ("q", influxql)])?,
            None => self.endpoint("/query", &[("q", influxql)])?,
        };
        self.connection.send_checked(HttpRequest::post(url)).await?;
        Ok(())
    }

    /// Create a database.
    pub async fn create_database(&self, database: &str) -> Result<(), StoreError> {
        self.action(&format!("CREATE DATABASE {}", quote_ident(database)), None)
            .await
    }

    /// Drop a database, the client default when `database` is `None`.
    pub async fn drop_database(&self, database: Option<&str>) -> Result<(), StoreError> {
        let database = self.resolve_database(database)?;
        self.action(
            &format!("DROP DATABASE {}", quote_ident(database)),
            Some(database),
        )
        .await
    }

    /// Drop a measurement from a database.
    pub async fn drop_measurement(
        &self,
        measurement: &str,
        database: Option<&str>,
    ) -> Result<(), StoreError> {
        let database = self.resolve_database(database)?;
        self.action(
            &format!("DROP MEASUREMENT {}", quote_ident(measurement)),
            Some(database),
        )
        .await
    }
}

/// Decode a chunked query body: one JSON document per non-empty line.
pub fn decode_chunks(body: &str) -> Result<QueryResult, StoreError> {
    let mut result = QueryResult::default();
    let mut decoded = 0usize;

    for line in body.lines().filter(|line| !line.trim().is_empty()) {
        let chunk: QueryResult = serde_json::from_str(line).map_err(|e| {
            StoreError::decode(format!("Query chunk is not JSON ({}): {}", e, line))
        })?;
        result.merge(chunk);
        decoded += 1;
    }

    if decoded == 0 {
        return Err(StoreError::decode("Query response is empty"));
    }
    Ok(result)
}

#[async_trait]
impl StoreClient for InfluxDbClient {
    fn backend(&self) -> Backend {
        Backend::InfluxDb
    }

    fn base_url(&self) -> &str {
        self.connection.base_url()
    }

    fn version(&self) -> u32 {
        self.connection.version()
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        self.connection.health_check().await
    }
}
