//! Elasticsearch request and response helpers.
//!
//! Pure functions shared by the client: bulk body rendering, search body
//! preparation, keep-alive formatting and response field extraction.

use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::errors::StoreError;
use bools_shared::Record;

/// Action line preceding every document in a plain bulk write.
pub const BULK_INDEX_ACTION: &str = r#"{"index":{}}"#;

/// Maximum number of per-item bulk errors reported per chunk.
pub const MAX_REPORTED_ITEM_ERRORS: usize = 10;

/// Render one record as an action/document line pair.
pub fn bulk_line(record: Record) -> String {
    format!("{}\n{}\n", BULK_INDEX_ACTION, Value::Object(record))
}

/// Render an explicit action and its document as a line pair.
pub fn bulk_action_line(action: &Value, document: Record) -> String {
    format!("{}\n{}\n", action, Value::Object(document))
}

/// Build the `index` action for a record routed to `index` with an optional id.
pub fn index_action(index: &str, id: Option<&str>) -> Value {
    let mut meta = Map::new();
    meta.insert("_index".to_string(), json!(index));
    if let Some(id) = id {
        meta.insert("_id".to_string(), json!(id));
    }
    json!({ "index": meta })
}

/// Bulk endpoint path.
///
/// `type_segment` is `"{type}/"` for backends that still use mapping types
/// and empty otherwise. An empty index leaves routing to the action lines.
pub fn bulk_path(index: &str, type_segment: &str) -> String {
    if index.is_empty() {
        format!("/{}_bulk", type_segment)
    } else {
        format!("/{}/{}_bulk", index, type_segment)
    }
}

/// Template pattern covering writes to `index`.
///
/// An index already ending in `*` is used as is; otherwise the prefix up to
/// the first non-word character is widened with `*` (`logs-2024.01` becomes
/// `logs*`).
pub fn index_pattern(index: &str) -> String {
    if index.ends_with('*') {
        return index.to_string();
    }
    let prefix: String = index
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    format!("{}*", prefix)
}

/// Inject a cheap `_doc` sort unless the body sorts already or the caller
/// wants score ordering.
pub fn prepare_search_body(body: &mut Map<String, Value>, sort_by_score: bool) {
    if !sort_by_score && !body.contains_key("sort") {
        body.insert("sort".to_string(), json!(["_doc"]));
    }
}

/// Scroll keep-alive for a request timeout, in whole minutes, at least one.
pub fn keep_alive(timeout: Duration) -> String {
    format!("{}m", (timeout.as_secs() / 60).max(1))
}

/// Read the total hit count from a search response.
///
/// Versions up to 6 expose `hits.total` as a bare integer, later versions
/// as `{"value": n, "relation": ...}`.
pub fn total_hits(response: &Value, version: u32) -> Result<u64, StoreError> {
    let total = &response["hits"]["total"];
    let count = if version <= 6 {
        total.as_u64()
    } else {
        total["value"].as_u64()
    };

    count.ok_or_else(|| StoreError::decode(format!("Missing hits.total in response: {}", total)))
}

/// Take the `hits.hits` array out of a response, leaving an empty array.
pub fn take_hits(response: &mut Value) -> Vec<Value> {
    let hits = response
        .get_mut("hits")
        .and_then(|hits| hits.get_mut("hits"))
        .map(Value::take);

    match hits {
        Some(Value::Array(hits)) => hits,
        _ => Vec::new(),
    }
}

/// Collect the per-item errors of a bulk response whose `errors` flag is set.
///
/// Returns every error found; callers cap what they log.
pub fn bulk_item_errors(response: &Value) -> Vec<String> {
    if response.get("errors").and_then(Value::as_bool) != Some(true) {
        return Vec::new();
    }

    response
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_object()?.values().next()?.get("error"))
                .map(Value::to_string)
                .collect()
        })
        .unwrap_or_default()
}
