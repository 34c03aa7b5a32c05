//! Decoded InfluxDB query results.
//!
//! InfluxDB answers `GET /query` with `{"results": [...]}`. With `chunked`
//! enabled the same statement may be split over several documents, each
//! carrying a slice of a series flagged `partial`. [`QueryResult::merge`]
//! stitches those slices back together.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The top level body of an InfluxDB query response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The result of one InfluxQL statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub statement_id: u32,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

/// A block of rows sharing a measurement name and tag set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Map<String, Value>>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

impl Series {
    fn continues(&self, next: &Series) -> bool {
        self.partial && self.name == next.name && self.tags == next.tags
    }
}

impl QueryResult {
    /// Fold a subsequent chunk into this result.
    ///
    /// Statements are matched by `statement_id`. A series continues the last
    /// series of its statement when that one was flagged partial and shares
    /// its name and tags; otherwise it is appended as a new block.
    pub fn merge(&mut self, chunk: QueryResult) {
        if self.error.is_none() {
            self.error = chunk.error;
        }

        for statement in chunk.results {
            let position = self
                .results
                .iter()
                .position(|r| r.statement_id == statement.statement_id);

            let Some(position) = position else {
                self.results.push(statement);
                continue;
            };
            let existing = &mut self.results[position];

            if existing.error.is_none() {
                existing.error = statement.error;
            }
            existing.partial = statement.partial;

            for series in statement.series {
                let continues = existing
                    .series
                    .last()
                    .is_some_and(|last| last.continues(&series));

                if !continues {
                    existing.series.push(series);
                } else if let Some(last) = existing.series.last_mut() {
                    last.partial = series.partial;
                    last.values.extend(series.values);
                }
            }
        }
    }

    /// Total number of rows across every statement and series.
    pub fn row_count(&self) -> usize {
        self.results
            .iter()
            .flat_map(|r| r.series.iter())
            .map(|s| s.values.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(body: Value) -> QueryResult {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_merge_partial_series() {
        let mut result = chunk(json!({
            "results": [{
                "statement_id": 0,
                "series": [{"name": "cpu", "columns": ["time", "v"], "values": [[1, 1.0]], "partial": true}],
                "partial": true
            }]
        }));
        result.merge(chunk(json!({
            "results": [{
                "statement_id": 0,
                "series": [{"name": "cpu", "columns": ["time", "v"], "values": [[2, 2.0]]}]
            }]
        })));

        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].series.len(), 1);
        assert_eq!(result.results[0].series[0].values.len(), 2);
        assert!(!result.results[0].series[0].partial);
        assert!(!result.results[0].partial);
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn test_merge_new_series_and_statement() {
        let mut result = chunk(json!({
            "results": [{
                "statement_id": 0,
                "series": [{"name": "cpu", "columns": ["time"], "values": [[1]]}]
            }]
        }));
        result.merge(chunk(json!({
            "results": [
                {"statement_id": 0, "series": [{"name": "mem", "columns": ["time"], "values": [[1]]}]},
                {"statement_id": 1, "series": [{"name": "disk", "columns": ["time"], "values": [[1]]}]}
            ]
        })));

        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].series.len(), 2);
        assert_eq!(result.results[1].series[0].name, "disk");
    }

    #[test]
    fn test_merge_keeps_first_error() {
        let mut result = QueryResult::default();
        result.merge(chunk(json!({"error": "first"})));
        result.merge(chunk(json!({"error": "second"})));
        assert_eq!(result.error.as_deref(), Some("first"));
    }

    #[test]
    fn test_decode_empty_statement() {
        let result = chunk(json!({"results": [{"statement_id": 0}]}));
        assert!(result.results[0].series.is_empty());
        assert_eq!(result.row_count(), 0);
    }
}
