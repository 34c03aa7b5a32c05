//! Conversions between plain record sequences and the client payloads.
//!
//! These cover the common "table in, table out" flows: turning records into
//! routed bulk actions or line protocol points, and flattening query
//! responses back into records.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde_json::{Number, Value};

use crate::elasticsearch::queries::{index_action, take_hits};
use crate::elasticsearch::BulkAction;
use crate::errors::StoreError;
use crate::influxdb::line_protocol::{Point, TimestampNormalizer, NAIVE_UTC_OFFSET_SECS};
use bools_shared::{is_missing, QueryResult, Record};

/// Offset applied to query times when none is requested, UTC+8.
pub const DEFAULT_TZ_OFFSET_SECS: i32 = NAIVE_UTC_OFFSET_SECS;

/// Suffix appended to naive datetime strings before they reach Elasticsearch.
const ES_NAIVE_SUFFIX: &str = "+0800";

const ES_NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Where each record is written: a fixed name, or a name read from a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Fixed(String),
    Column(String),
}

/// Target index of an Elasticsearch write.
pub type IndexTarget = Target;

/// Target measurement of an InfluxDB write.
pub type MeasurementTarget = Target;

impl Target {
    /// Build a target from the two optional arguments.
    ///
    /// Exactly one of `fixed` and `column` must be given.
    pub fn resolve(fixed: Option<&str>, column: Option<&str>) -> Result<Self, StoreError> {
        match (fixed, column) {
            (Some(_), Some(_)) => Err(StoreError::validation(
                "a fixed target and a target column cannot both be given",
            )),
            (None, None) => Err(StoreError::validation(
                "either a fixed target or a target column must be given",
            )),
            (Some(fixed), None) => Ok(Target::Fixed(fixed.to_string())),
            (None, Some(column)) => Ok(Target::Column(column.to_string())),
        }
    }

    /// The target for `record`, removing the target column from it.
    fn take_from(&self, record: &mut Record) -> Result<String, StoreError> {
        match self {
            Target::Fixed(name) => Ok(name.clone()),
            Target::Column(column) => match record.remove(column) {
                Some(Value::String(name)) if !name.is_empty() => Ok(name),
                Some(Value::Number(number)) => Ok(number.to_string()),
                other => Err(StoreError::validation(format!(
                    "Target column {:?} holds no usable name: {:?}",
                    column, other
                ))),
            },
        }
    }
}

/// Options for [`es_actions`].
#[derive(Debug, Clone)]
pub struct EsWriteOptions {
    pub target: IndexTarget,
    /// Column whose value becomes the document `_id`.
    pub id_col: Option<String>,
    /// Convert columns of numeric-looking strings to floats.
    pub numeric_detection: bool,
}

impl EsWriteOptions {
    pub fn new(target: IndexTarget) -> Self {
        Self {
            target,
            id_col: None,
            numeric_detection: false,
        }
    }

    pub fn with_id_col(mut self, id_col: impl Into<String>) -> Self {
        self.id_col = Some(id_col.into());
        self
    }

    pub fn with_numeric_detection(mut self, numeric_detection: bool) -> Self {
        self.numeric_detection = numeric_detection;
        self
    }
}

/// Bulk actions ready for [`ElasticsearchClient::write_actions`].
///
/// [`ElasticsearchClient::write_actions`]: crate::elasticsearch::ElasticsearchClient::write_actions
#[derive(Debug, Clone, PartialEq)]
pub struct BulkBatch {
    /// Index of the first record, used for template bootstrap.
    pub index: String,
    pub actions: Vec<BulkAction>,
}

/// Turn records into routed bulk actions.
///
/// The target and id columns are removed from each document and null values
/// are dropped. Naive datetime strings get a `+0800` suffix and `+08:00`
/// style offsets lose their colon, the forms Elasticsearch date detection
/// accepts.
///
/// Returns `Ok(None)` for empty input so callers skip the request.
pub fn es_actions<I>(records: I, options: &EsWriteOptions) -> Result<Option<BulkBatch>, StoreError>
where
    I: IntoIterator<Item = Record>,
{
    let records: Vec<Record> = records.into_iter().collect();
    if records.is_empty() {
        return Ok(None);
    }

    let numeric = if options.numeric_detection {
        numeric_columns(&records)
    } else {
        HashSet::new()
    };

    let mut actions = Vec::with_capacity(records.len());
    for mut record in records {
        let index = options.target.take_from(&mut record)?;
        let id = match &options.id_col {
            Some(column) => record.remove(column).and_then(|id| match id {
                Value::Null => None,
                Value::String(id) => Some(id),
                other => Some(other.to_string()),
            }),
            None => None,
        };

        let document = record
            .into_iter()
            .filter(|(_, value)| !is_missing(value))
            .map(|(key, value)| {
                let value = if numeric.contains(&key) {
                    to_float(value)
                } else {
                    es_value(value)
                };
                (key, value)
            })
            .collect();

        actions.push(BulkAction {
            action: index_action(&index, id.as_deref()),
            document,
        });
    }

    let index = actions
        .first()
        .and_then(|action| action.action["index"]["_index"].as_str())
        .unwrap_or_default()
        .to_string();

    Ok(Some(BulkBatch { index, actions }))
}

/// Columns where every present value is a number or a numeric string, and
/// at least one is a string.
fn numeric_columns(records: &[Record]) -> HashSet<String> {
    let mut candidates: HashSet<String> = HashSet::new();
    let mut rejected: HashSet<String> = HashSet::new();

    for record in records {
        for (key, value) in record {
            if rejected.contains(key) {
                continue;
            }
            match value {
                Value::Null | Value::Number(_) => {}
                Value::String(text) if text.trim().parse::<f64>().is_ok() => {
                    candidates.insert(key.clone());
                }
                _ => {
                    candidates.remove(key);
                    rejected.insert(key.clone());
                }
            }
        }
    }

    candidates
}

fn to_float(value: Value) -> Value {
    let parsed = value
        .as_str()
        .and_then(|text| text.trim().parse::<f64>().ok())
        .and_then(Number::from_f64);
    parsed.map(Value::Number).unwrap_or(value)
}

fn es_value(value: Value) -> Value {
    match value {
        Value::String(text) => Value::String(es_datetime(&text).unwrap_or(text)),
        other => other,
    }
}

/// Rewrite a datetime string into a form Elasticsearch parses, or `None`
/// when the string is not a datetime or needs no change.
fn es_datetime(text: &str) -> Option<String> {
    if ES_NAIVE_FORMATS
        .iter()
        .any(|format| NaiveDateTime::parse_from_str(text, format).is_ok())
    {
        return Some(format!("{}{}", text, ES_NAIVE_SUFFIX));
    }

    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z"))
        .ok()?;

    let (head, minutes) = text.rsplit_once(':')?;
    let sign = head.len().checked_sub(3).and_then(|at| head.get(at..))?;
    let is_offset = minutes.len() == 2
        && minutes.chars().all(|c| c.is_ascii_digit())
        && sign.starts_with(['+', '-'])
        && sign[1..].chars().all(|c| c.is_ascii_digit());

    is_offset.then(|| format!("{}{}", head, minutes))
}

/// The `_source` of every hit in a search or scroll response.
pub fn hits_to_records(mut response: Value) -> Vec<Record> {
    take_hits(&mut response)
        .into_iter()
        .filter_map(|mut hit| match hit.get_mut("_source").map(Value::take) {
            Some(Value::Object(source)) => Some(source),
            _ => None,
        })
        .collect()
}

/// Options for [`records_to_points`].
#[derive(Debug, Clone)]
pub struct PointOptions {
    pub target: MeasurementTarget,
    pub tag_cols: Vec<String>,
    /// Column holding the point time. `None` lets the server stamp points.
    pub time_col: Option<String>,
}

impl PointOptions {
    pub fn new(target: MeasurementTarget) -> Self {
        Self {
            target,
            tag_cols: Vec::new(),
            time_col: None,
        }
    }

    pub fn with_tag_cols<I, S>(mut self, tag_cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_cols = tag_cols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_time_col(mut self, time_col: impl Into<String>) -> Self {
        self.time_col = Some(time_col.into());
        self
    }
}

/// Turn records into line protocol points.
///
/// Tag columns become tags and every other non-null column a field. The
/// time column is normalised to nanoseconds, with the scale of numeric
/// timestamps fixed by the first record.
pub fn records_to_points<I>(records: I, options: &PointOptions) -> Result<Vec<Point>, StoreError>
where
    I: IntoIterator<Item = Record>,
{
    let mut normalizer = TimestampNormalizer::new();

    records
        .into_iter()
        .map(|mut record| -> Result<Point, StoreError> {
            let measurement = options.target.take_from(&mut record)?;
            let mut point = Point::new(measurement);

            if let Some(time_col) = &options.time_col {
                let time = record
                    .remove(time_col)
                    .filter(|value| !is_missing(value))
                    .ok_or_else(|| {
                        StoreError::validation(format!("Time column {:?} is missing", time_col))
                    })?;
                point = point.timestamp(normalizer.normalize(&time)?);
            }

            for tag in &options.tag_cols {
                if let Some(value) = record.remove(tag) {
                    point = point.tag(tag.as_str(), value);
                }
            }

            for (key, value) in record {
                if !is_missing(&value) {
                    point = point.field(key, value);
                }
            }

            Ok(point)
        })
        .collect()
}

/// Flatten the series of the first statement into records.
///
/// Each row is keyed by column name, series tags included. `time` strings
/// are shifted to the fixed offset `tz_offset_secs` east of UTC.
///
/// Series are appended one after another, not joined side by side on
/// `time`. A `GROUP BY` query yields one block of rows per tag set, and two
/// series sharing a timestamp produce two rows.
pub fn series_to_rows(result: &QueryResult, tz_offset_secs: i32) -> Result<Vec<Record>, StoreError> {
    let offset = FixedOffset::east_opt(tz_offset_secs).ok_or_else(|| {
        StoreError::validation(format!("Invalid timezone offset {}s", tz_offset_secs))
    })?;

    let Some(statement) = result.results.first() else {
        return Ok(Vec::new());
    };
    if let Some(error) = &statement.error {
        return Err(StoreError::decode(format!("Statement failed: {}", error)));
    }

    let mut rows = Vec::new();
    for series in &statement.series {
        for values in &series.values {
            let mut row = Record::new();
            for (column, value) in series.columns.iter().zip(values) {
                let value = if column == "time" {
                    shift_time(value, offset)
                } else {
                    value.clone()
                };
                row.insert(column.clone(), value);
            }
            if let Some(tags) = &series.tags {
                for (key, value) in tags {
                    row.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
            rows.push(row);
        }
    }

    Ok(rows)
}

fn shift_time(value: &Value, offset: FixedOffset) -> Value {
    match value.as_str().map(DateTime::parse_from_rfc3339) {
        Some(Ok(time)) => Value::String(time.with_timezone(&offset).to_rfc3339()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::WriteOptions;
    use crate::config::ConnectionConfig;
    use crate::elasticsearch::{ElasticsearchClient, ScrollOptions, TEMPLATE_NAME};
    use crate::influxdb::line_protocol::parse_datetime_nanos;
    use crate::influxdb::InfluxDbClient;
    use crate::transport::mock::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_target_resolve() {
        assert_eq!(
            Target::resolve(Some("logs"), None).unwrap(),
            Target::Fixed("logs".to_string())
        );
        assert_eq!(
            Target::resolve(None, Some("idx")).unwrap(),
            Target::Column("idx".to_string())
        );
        assert!(matches!(
            Target::resolve(Some("logs"), Some("idx")),
            Err(StoreError::ValidationError(_))
        ));
        assert!(matches!(
            Target::resolve(None, None),
            Err(StoreError::ValidationError(_))
        ));
    }

    #[test]
    fn test_es_actions_routes_and_cleans() {
        let records = vec![
            record(json!({"idx": "logs-a", "id": 7, "msg": "hi", "gone": null})),
            record(json!({"idx": "logs-b", "id": null, "msg": "yo"})),
        ];
        let options = EsWriteOptions::new(Target::Column("idx".to_string())).with_id_col("id");

        let batch = es_actions(records, &options).unwrap().unwrap();

        assert_eq!(batch.index, "logs-a");
        assert_eq!(
            batch.actions[0].action,
            json!({"index": {"_index": "logs-a", "_id": "7"}})
        );
        assert_eq!(Value::Object(batch.actions[0].document.clone()), json!({"msg": "hi"}));
        assert_eq!(batch.actions[1].action, json!({"index": {"_index": "logs-b"}}));
    }

    #[test]
    fn test_es_actions_empty_input() {
        let options = EsWriteOptions::new(Target::Fixed("logs".to_string()));
        assert!(es_actions(Vec::new(), &options).unwrap().is_none());
    }

    #[test]
    fn test_es_actions_missing_index_column() {
        let options = EsWriteOptions::new(Target::Column("idx".to_string()));
        let result = es_actions(vec![record(json!({"msg": "hi"}))], &options);
        assert!(matches!(result, Err(StoreError::ValidationError(_))));
    }

    #[test]
    fn test_es_actions_numeric_detection() {
        let records = vec![
            record(json!({"price": "1.5", "code": "007", "name": "a"})),
            record(json!({"price": "2", "code": "x1", "name": "b"})),
        ];
        let options =
            EsWriteOptions::new(Target::Fixed("shop".to_string())).with_numeric_detection(true);

        let batch = es_actions(records, &options).unwrap().unwrap();

        assert_eq!(batch.actions[0].document["price"], json!(1.5));
        assert_eq!(batch.actions[1].document["price"], json!(2.0));
        assert_eq!(batch.actions[0].document["code"], json!("007"));
        assert_eq!(batch.actions[1].document["name"], json!("b"));
    }

    #[test]
    fn test_es_datetime() {
        assert_eq!(
            es_datetime("2024-01-01 10:00:00").as_deref(),
            Some("2024-01-01 10:00:00+0800")
        );
        assert_eq!(
            es_datetime("2024-01-01 10:00:00+08:00").as_deref(),
            Some("2024-01-01 10:00:00+0800")
        );
        assert_eq!(
            es_datetime("2024-01-01T10:00:00-05:30").as_deref(),
            Some("2024-01-01T10:00:00-0530")
        );
        assert_eq!(es_datetime("2024-01-01T10:00:00Z"), None);
        assert_eq!(es_datetime("hello: world"), None);
        assert_eq!(es_datetime("12:30"), None);
    }

    #[test]
    fn test_hits_to_records() {
        let response = json!({
            "took": 3,
            "hits": {"hits": [
                {"_id": "1", "_source": {"a": 1}},
                {"_id": "2"},
                {"_id": "3", "_source": {"a": 3}}
            ]}
        });

        let records = hits_to_records(response);

        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["a"], json!(3));
        assert!(hits_to_records(json!({})).is_empty());
    }

    #[test]
    fn test_records_to_points() {
        let records = vec![
            record(json!({"m": "cpu", "host": "a", "ts": 1_700_000_000, "load": 0.5, "note": null})),
            record(json!({"m": "mem", "host": null, "ts": 1_700_000_001, "used": 3})),
        ];
        let options = PointOptions::new(Target::Column("m".to_string()))
            .with_tag_cols(["host"])
            .with_time_col("ts");

        let points = records_to_points(records, &options).unwrap();

        assert_eq!(
            points[0].to_line().unwrap(),
            "cpu,host=a load=0.5 1700000000000000000"
        );
        assert_eq!(points[1].to_line().unwrap(), "mem used=3 1700000001000000000");
    }

    #[test]
    fn test_records_to_points_mixed_numbers_in_one_field() {
        let records = vec![
            record(json!({"ts": 1_700_000_000, "v": 1})),
            record(json!({"ts": 1_700_000_001, "v": 1.5})),
        ];
        let options = PointOptions::new(Target::Fixed("cpu".to_string())).with_time_col("ts");

        let lines: Vec<String> = records_to_points(records, &options)
            .unwrap()
            .iter()
            .map(|point| point.to_line().unwrap())
            .collect();

        assert_eq!(
            lines,
            vec![
                "cpu v=1 1700000000000000000".to_string(),
                "cpu v=1.5 1700000001000000000".to_string(),
            ]
        );
    }

    #[test]
    fn test_records_to_points_scale_fixed_by_first_sample() {
        let records = vec![
            record(json!({"ts": 1_700_000_000_000i64, "v": 1})),
            record(json!({"ts": 1_700_000_001_000i64, "v": 2})),
        ];
        let options = PointOptions::new(Target::Fixed("cpu".to_string())).with_time_col("ts");

        let points = records_to_points(records, &options).unwrap();

        assert_eq!(points[1].timestamp, Some(1_700_000_001_000_000_000));
    }

    #[test]
    fn test_records_to_points_rejects_bad_time() {
        let options = PointOptions::new(Target::Fixed("cpu".to_string())).with_time_col("ts");

        let result = records_to_points(vec![record(json!({"ts": 12345, "v": 1}))], &options);
        assert!(matches!(result, Err(StoreError::ValidationError(_))));

        let result = records_to_points(vec![record(json!({"v": 1}))], &options);
        assert!(matches!(result, Err(StoreError::ValidationError(_))));
    }

    #[test]
    fn test_records_to_points_empty_input() {
        let options = PointOptions::new(Target::Fixed("cpu".to_string()));
        assert!(records_to_points(Vec::new(), &options).unwrap().is_empty());
    }

    #[test]
    fn test_series_to_rows() {
        let result: QueryResult = serde_json::from_value(json!({
            "results": [{
                "statement_id": 0,
                "series": [{
                    "name": "cpu",
                    "tags": {"host": "a"},
                    "columns": ["time", "v"],
                    "values": [["2023-11-14T22:13:20Z", 1], ["2023-11-14T22:13:21Z", 2]]
                }]
            }]
        }))
        .unwrap();

        let rows = series_to_rows(&result, DEFAULT_TZ_OFFSET_SECS).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["time"], json!("2023-11-15T06:13:20+08:00"));
        assert_eq!(rows[1]["v"], json!(2));
        assert_eq!(rows[1]["host"], json!("a"));

        let utc = series_to_rows(&result, 0).unwrap();
        assert_eq!(utc[0]["time"], json!("2023-11-14T22:13:20+00:00"));
    }

    #[test]
    fn test_series_to_rows_statement_error() {
        let result: QueryResult = serde_json::from_value(json!({
            "results": [{"statement_id": 0, "error": "database not found: x"}]
        }))
        .unwrap();

        assert!(matches!(
            series_to_rows(&result, 0),
            Err(StoreError::DecodeError(_))
        ));
        assert!(series_to_rows(&QueryResult::default(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_series_to_rows_lists_grouped_series_in_order() {
        let result: QueryResult = serde_json::from_value(json!({
            "results": [{
                "statement_id": 0,
                "series": [
                    {
                        "name": "cpu",
                        "tags": {"host": "a"},
                        "columns": ["time", "v"],
                        "values": [["2023-11-14T22:13:20Z", 1]]
                    },
                    {
                        "name": "cpu",
                        "tags": {"host": "b"},
                        "columns": ["time", "v"],
                        "values": [["2023-11-14T22:13:20Z", 2]]
                    }
                ]
            }]
        }))
        .unwrap();

        let rows = series_to_rows(&result, 0).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["time"], rows[1]["time"]);
        assert_eq!(rows[0]["host"], json!("a"));
        assert_eq!(rows[0]["v"], json!(1));
        assert_eq!(rows[1]["host"], json!("b"));
        assert_eq!(rows[1]["v"], json!(2));
    }

    #[tokio::test]
    async fn test_elasticsearch_write_then_scroll_returns_record() {
        let transport = Arc::new(MockTransport::new());
        let config = ConnectionConfig::new("es", 9200).with_version(7);
        let client = ElasticsearchClient::connect(transport.clone(), &config)
            .await
            .unwrap();
        transport
            .respond_json(200, json!({ TEMPLATE_NAME: { "index_patterns": ["events*"] } }))
            .respond_json(200, json!({"took": 1, "errors": false, "items": []}));

        let input = record(json!({"host": "a", "value": 1.5, "count": 3}));
        let options = EsWriteOptions::new(Target::Fixed("events".to_string()));
        let batch = es_actions(vec![input.clone()], &options).unwrap().unwrap();
        client
            .write_actions(&batch.index, batch.actions, &WriteOptions::default())
            .await
            .unwrap();

        let body = transport.requests()[1].body.clone().unwrap();
        let stored: Value = serde_json::from_str(body.lines().nth(1).unwrap()).unwrap();

        transport.respond_json(
            200,
            json!({
                "took": 1,
                "_scroll_id": "s1",
                "hits": {"total": {"value": 1, "relation": "eq"}, "hits": [{"_source": stored}]}
            }),
        );
        let response = client
            .scroll_query("events", json!({}), &ScrollOptions::with_total_size(1))
            .await
            .unwrap();

        assert_eq!(hits_to_records(response), vec![input]);
    }

    #[tokio::test]
    async fn test_influxdb_write_then_query_returns_record() {
        let transport = Arc::new(MockTransport::new());
        let config = ConnectionConfig::new("influx", 8086).with_version(1);
        let client = InfluxDbClient::connect(transport.clone(), &config, Some("metrics".to_string()))
            .await
            .unwrap();
        transport.respond(204, "");

        let input = record(json!({"ts": 1_700_000_000, "host": "a", "n": 2, "v": 1.5}));
        let options = PointOptions::new(Target::Fixed("cpu".to_string()))
            .with_tag_cols(["host"])
            .with_time_col("ts");
        let points = records_to_points(vec![input.clone()], &options).unwrap();
        client
            .write_points(points, None, &WriteOptions::default())
            .await
            .unwrap();

        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body, "cpu,host=a n=2,v=1.5 1700000000000000000");

        transport.respond_json(
            200,
            json!({"results": [{
                "statement_id": 0,
                "series": [{
                    "name": "cpu",
                    "tags": {"host": "a"},
                    "columns": ["time", "n", "v"],
                    "values": [["2023-11-14T22:13:20Z", 2, 1.5]]
                }]
            }]}),
        );
        let result = client
            .query("SELECT * FROM cpu GROUP BY host LIMIT 1", None, 1, None)
            .await
            .unwrap();
        let rows = series_to_rows(&result, 0).unwrap();

        assert_eq!(rows.len(), 1);
        for key in ["host", "n", "v"] {
            assert_eq!(rows[0][key], input[key]);
        }
        let time = rows[0]["time"].as_str().unwrap();
        assert_eq!(parse_datetime_nanos(time).unwrap(), 1_700_000_000_000_000_000);
    }
}
