//! Elasticsearch client implementation.
//!
//! Talks to Elasticsearch through an injected [`HttpTransport`]. Writes go
//! through the bulk API in sequential chunks; large reads go through the
//! scroll API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::batch::{chunks, WriteOptions, WriteSummary};
use crate::config::ConnectionConfig;
use crate::connection::{decode_json, Connection, Probe};
use crate::elasticsearch::queries::{
    bulk_action_line, bulk_item_errors, bulk_line, bulk_path, index_pattern, keep_alive,
    prepare_search_body, take_hits, total_hits, MAX_REPORTED_ITEM_ERRORS,
};
use crate::elasticsearch::template::{stored_patterns, template_body, TEMPLATE_NAME};
use crate::errors::StoreError;
use crate::interfaces::{Backend, HttpRequest, HttpTransport, StoreClient};
use bools_shared::Record;

/// Default document type for backends that still use mapping types.
pub const DEFAULT_DOC_TYPE: &str = "_doc";

/// Default page size for scroll queries.
pub const DEFAULT_SCROLL_BATCH_SIZE: usize = 1000;

fn version_field(body: &Value) -> Option<&str> {
    body.get("version")?.get("number")?.as_str()
}

const ELASTICSEARCH_PROBE: Probe = Probe {
    path: "",
    version_field,
};

/// Options for a single search request.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Keep score ordering instead of the cheaper `_doc` sort.
    pub sort_by_score: bool,
    /// Open a scroll cursor kept alive for the request timeout.
    pub create_scroll: bool,
    /// Request timeout. `None` uses the connection default.
    pub timeout: Option<Duration>,
}

/// Options for a full scroll retrieval.
#[derive(Debug, Clone)]
pub struct ScrollOptions {
    /// Page size used when the query body has no `size`.
    pub batch_size: usize,
    /// Request timeout, also used to derive the cursor keep-alive.
    pub timeout: Option<Duration>,
    /// Expected number of hits. `None` trusts the backend's total.
    pub total_size: Option<usize>,
    /// Log progress after every page.
    pub log: bool,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_SCROLL_BATCH_SIZE,
            timeout: None,
            total_size: None,
            log: false,
        }
    }
}

impl ScrollOptions {
    /// Stop after `total_size` hits.
    pub fn with_total_size(total_size: usize) -> Self {
        Self {
            total_size: Some(total_size),
            ..Default::default()
        }
    }
}

/// One routed bulk action: where a document goes and the document itself.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkAction {
    /// Action line, e.g. `{"index": {"_index": "logs", "_id": "1"}}`.
    pub action: Value,
    pub document: Record,
}

/// A document body, either structured or already serialized.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Json(Value),
    Raw(String),
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Record> for Document {
    fn from(record: Record) -> Self {
        Self::Json(Value::Object(record))
    }
}

impl From<String> for Document {
    fn from(raw: String) -> Self {
        Self::Raw(raw)
    }
}

impl From<&str> for Document {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_string())
    }
}

/// Elasticsearch client.
///
/// # Example
///
/// ```ignore
/// let transport = Arc::new(ReqwestTransport::new()?);
/// let client = ElasticsearchClient::connect(transport, &ConnectionConfig::elasticsearch()).await?;
///
/// client.write("events", records, &WriteOptions::default()).await?;
/// let result = client
///     .scroll_query("events", json!({"query": {"match_all": {}}}), &ScrollOptions::default())
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct ElasticsearchClient {
    connection: Connection,
    doc_type: String,
}

impl ElasticsearchClient {
    /// Connect with the default `_doc` document type.
    ///
    /// # Returns
    ///
    /// * `Ok(ElasticsearchClient)` - The cluster answered the probe
    /// * `Err(StoreError::ConstructionError)` - The probe failed
    pub async fn connect(
        transport: Arc<dyn HttpTransport>,
        config: &ConnectionConfig,
    ) -> Result<Self, StoreError> {
        Self::connect_with_type(transport, config, DEFAULT_DOC_TYPE).await
    }

    /// Connect with a custom document type, used by backends up to version 6.
    pub async fn connect_with_type(
        transport: Arc<dyn HttpTransport>,
        config: &ConnectionConfig,
        doc_type: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let connection =
            Connection::establish(transport, config, Backend::Elasticsearch, ELASTICSEARCH_PROBE)
                .await?;

        Ok(Self {
            connection,
            doc_type: doc_type.into(),
        })
    }

    /// The document type name.
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    /// URL segment naming the document type, only present up to version 6.
    fn type_segment(&self) -> String {
        if self.connection.version() <= 6 {
            format!("{}/", self.doc_type)
        } else {
            String::new()
        }
    }

    /// Bulk index `records` into `index`, `batch_size` records per request.
    ///
    /// Before the first chunk the shared template is checked to cover the
    /// index family. A chunk answered with a non-2xx status aborts the call;
    /// item errors inside a 2xx answer are logged (at most 10 per chunk) and
    /// the write moves on to the next chunk. Already accepted chunks are not
    /// rolled back when a later chunk fails.
    ///
    /// # Returns
    ///
    /// * `Ok(WriteSummary)` - Every chunk was accepted
    /// * `Err(StoreError)` - A chunk or the template bootstrap failed
    pub async fn write<I>(
        &self,
        index: &str,
        records: I,
        options: &WriteOptions,
    ) -> Result<WriteSummary, StoreError>
    where
        I: IntoIterator<Item = Record>,
    {
        self.write_lines(index, records.into_iter().map(bulk_line), options)
            .await
    }

    /// Serialize `items` and bulk index them like [`write`](Self::write).
    ///
    /// Every item is serialized before the first request. An item that fails
    /// to serialize, or is not a JSON object, fails the call with
    /// `SerializationError` without touching the cluster.
    pub async fn write_serialized<T, I>(
        &self,
        index: &str,
        items: I,
        options: &WriteOptions,
    ) -> Result<WriteSummary, StoreError>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        let records = items
            .into_iter()
            .map(|item| -> Result<Record, StoreError> {
                match serde_json::to_value(item)? {
                    Value::Object(record) => Ok(record),
                    other => Err(StoreError::serialization(format!(
                        "Document must serialize to a JSON object, got {}",
                        other
                    ))),
                }
            })
            .collect::<Result<Vec<Record>, StoreError>>()?;

        self.write(index, records, options).await
    }

    /// Bulk write prebuilt actions, letting each document pick its own index
    /// and id. `index` names the default target and the template family.
    pub async fn write_actions<I>(
        &self,
        index: &str,
        actions: I,
        options: &WriteOptions,
    ) -> Result<WriteSummary, StoreError>
    where
        I: IntoIterator<Item = BulkAction>,
    {
        let lines = actions
            .into_iter()
            .map(|BulkAction { action, document }| bulk_action_line(&action, document));
        self.write_lines(index, lines, options).await
    }

    #[instrument(skip(self, lines, options), fields(batch_size = options.batch_size))]
    async fn write_lines<I>(
        &self,
        index: &str,
        lines: I,
        options: &WriteOptions,
    ) -> Result<WriteSummary, StoreError>
    where
        I: Iterator<Item = String>,
    {
        let batches = chunks(lines, options.batch_size)?;
        self.check_template(&index_pattern(index), options.timeout)
            .await?;

        let url = self
            .connection
            .url(&bulk_path(index, &self.type_segment()));
        let mut summary = WriteSummary::default();

        for chunk in batches {
            let count = chunk.len();
            let request = with_timeout(
                HttpRequest::post(url.as_str()).json_body(chunk.concat()),
                options.timeout,
            );

            let response = self.connection.send_json(request).await?;
            summary.chunks += 1;
            summary.records += count;

            let item_errors = bulk_item_errors(&response);
            if !item_errors.is_empty() {
                summary.item_errors += item_errors.len();
                let reported: Vec<&str> = item_errors
                    .iter()
                    .take(MAX_REPORTED_ITEM_ERRORS)
                    .map(String::as_str)
                    .collect();
                error!(
                    chunk = summary.chunks,
                    failed = item_errors.len(),
                    errors = %reported.join("\n"),
                    "Bulk write reported item errors"
                );
            }

            debug!(chunk = summary.chunks, records = count, "Bulk chunk written");
        }

        Ok(summary)
    }

    /// Make sure the shared template covers `pattern`.
    ///
    /// The stored template is read on every call. If the pattern is missing
    /// it is appended and the template is written back.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The template was updated
    /// * `Ok(false)` - The pattern was already covered
    pub async fn check_template(
        &self,
        pattern: &str,
        timeout: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let url = self.connection.url(&format!("/_template/{}", TEMPLATE_NAME));
        let response = self
            .connection
            .send(with_timeout(HttpRequest::get(url), timeout))
            .await?;

        // A cluster without the template answers 404 with an empty object.
        let current = if response.status == 404 {
            json!({})
        } else {
            decode_json(response)?
        };

        let mut patterns = stored_patterns(&current, TEMPLATE_NAME);
        if patterns.iter().any(|p| p == pattern) {
            return Ok(false);
        }

        patterns.push(pattern.to_string());
        let body = template_body(&patterns, self.connection.version(), &self.doc_type);
        self.put_template(TEMPLATE_NAME, &body, timeout).await?;

        info!(pattern = %pattern, template = TEMPLATE_NAME, "Index template updated");
        Ok(true)
    }

    /// Store a legacy index template.
    pub async fn put_template(
        &self,
        name: &str,
        body: &Value,
        timeout: Option<Duration>,
    ) -> Result<Value, StoreError> {
        let url = self.connection.url(&format!("/_template/{}", name));
        let request = HttpRequest::put(url).json_body(body.to_string());
        self.connection
            .send_json(with_timeout(request, timeout))
            .await
    }

    /// Run one search request against `index`.
    ///
    /// `body` must be a JSON object. Unless the body sorts already or
    /// `sort_by_score` is set, a `_doc` sort is added. With `create_scroll`
    /// the response carries a `_scroll_id` kept alive for the timeout.
    pub async fn query(
        &self,
        index: &str,
        body: Value,
        options: &QueryOptions,
    ) -> Result<Value, StoreError> {
        let Value::Object(mut body) = body else {
            return Err(StoreError::validation("query body must be a JSON object"));
        };
        prepare_search_body(&mut body, options.sort_by_score);

        let timeout = options.timeout.unwrap_or_else(|| self.connection.timeout());
        let mut path = format!("/{}/_search", index);
        if options.create_scroll {
            path.push_str(&format!("?scroll={}", keep_alive(timeout)));
        }

        let request = HttpRequest::post(self.connection.url(&path))
            .json_body(Value::Object(body).to_string())
            .timeout(timeout);
        self.connection.send_json(request).await
    }

    /// Retrieve every hit of a query through the scroll API.
    ///
    /// The expected count is `total_size` when given, otherwise the total
    /// reported by the opening response. Pages are fetched until the backend
    /// reports an error, returns an empty page, or the expected count is
    /// reached. A short result is logged as a warning, not an error. The
    /// returned value is the opening response with `hits.hits` replaced by
    /// the accumulated hits, trimmed to the expected count, and `took`
    /// replaced by the total time of every page.
    #[instrument(skip(self, body, options), fields(batch_size = options.batch_size))]
    pub async fn scroll_query(
        &self,
        index: &str,
        body: Value,
        options: &ScrollOptions,
    ) -> Result<Value, StoreError> {
        let Value::Object(mut body) = body else {
            return Err(StoreError::validation("query body must be a JSON object"));
        };
        if !body.contains_key("size") {
            body.insert("size".to_string(), json!(options.batch_size));
        }

        let timeout = options.timeout.unwrap_or_else(|| self.connection.timeout());
        let query_options = QueryOptions {
            sort_by_score: false,
            create_scroll: true,
            timeout: Some(timeout),
        };
        let mut result = self.query(index, Value::Object(body), &query_options).await?;
        if !result.is_object() {
            return Err(StoreError::decode(format!(
                "Search response is not an object: {}",
                result
            )));
        }

        let expected = match options.total_size {
            Some(total_size) => total_size,
            None => total_hits(&result, self.connection.version())? as usize,
        };

        let mut took = result["took"].as_u64().unwrap_or(0);
        let mut hits = take_hits(&mut result);
        let mut scroll_id = result["_scroll_id"].as_str().map(str::to_string);
        let scroll_url = self.connection.url("/_search/scroll");
        let mut pages = 1usize;
        debug!(page = pages, hits = hits.len(), "Scroll page fetched");

        while hits.len() < expected {
            let Some(id) = scroll_id.as_deref() else {
                break;
            };

            let request = HttpRequest::post(scroll_url.as_str())
                .json_body(json!({"scroll_id": id, "scroll": keep_alive(timeout)}).to_string())
                .timeout(timeout);
            let response = self.connection.send(request).await?;

            let mut page: Value = match serde_json::from_str(&response.body) {
                Ok(page) => page,
                Err(_) if !response.is_success() => {
                    warn!(status = response.status, "Scroll page rejected");
                    break;
                }
                Err(e) => {
                    return Err(StoreError::decode(format!(
                        "Scroll page is not JSON ({}): {}",
                        e, response.body
                    )))
                }
            };
            if !response.is_success() || page.get("error").is_some() {
                warn!(status = response.status, error = %page["error"], "Scroll page reported an error");
                break;
            }

            let page_hits = take_hits(&mut page);
            if page_hits.is_empty() {
                break;
            }

            took += page["took"].as_u64().unwrap_or(0);
            if let Some(next) = page["_scroll_id"].as_str() {
                scroll_id = Some(next.to_string());
            }
            pages += 1;
            debug!(page = pages, hits = page_hits.len(), "Scroll page fetched");
            hits.extend(page_hits);

            if options.log {
                info!(hits = hits.len(), cost_ms = took, "Scroll progress");
            }
        }

        if hits.len() < expected {
            warn!(
                received = hits.len(),
                expected = expected,
                "Scroll returned fewer hits than expected, try a larger timeout or check the network"
            );
        }
        hits.truncate(expected);

        result["took"] = json!(took);
        result["hits"]["hits"] = Value::Array(hits);
        Ok(result)
    }

    /// Delete every index matching `index_pattern`.
    pub async fn delete(&self, index_pattern: &str) -> Result<Value, StoreError> {
        let url = self.connection.url(&format!("/{}", index_pattern));
        self.connection.send_json(HttpRequest::delete(url)).await
    }

    /// Index a single document, replacing any document with the same id.
    ///
    /// Without `doc_id` the backend assigns one.
    pub async fn create_or_cover(
        &self,
        index: &str,
        document: impl Into<Document>,
        doc_id: Option<&str>,
    ) -> Result<Value, StoreError> {
        let body = match document.into() {
            Document::Json(value) => value.to_string(),
            Document::Raw(raw) => raw,
        };
        let url = self
            .connection
            .url(&format!("/{}/_doc/{}", index, doc_id.unwrap_or("")));
        self.connection
            .send_json(HttpRequest::post(url).json_body(body))
            .await
    }
}

/// Apply an explicit timeout, leaving `None` to the connection default.
fn with_timeout(request: HttpRequest, timeout: Option<Duration>) -> HttpRequest {
    match timeout {
        Some(timeout) => request.timeout(timeout),
        None => request,
    }
}

#[async_trait]
impl StoreClient for ElasticsearchClient {
    fn backend(&self) -> Backend {
        Backend::Elasticsearch
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
