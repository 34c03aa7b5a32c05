//! Elasticsearch index template settings and mappings.
//!
//! Every index written through the client is covered by one shared legacy
//! template whose pattern list grows as new index families are written.

use serde_json::{json, Value};

/// The name of the shared index template.
pub const TEMPLATE_NAME: &str = "bowaer";

/// Date layouts recognised when a string field is first seen.
pub const DYNAMIC_DATE_FORMATS: [&str; 7] = [
    "yyyy-MM-dd HH:mm:ss.SSSZ||epoch_millis",
    "yyyy-MM-dd HH:mm:ss.SSSSSSZ||epoch_millis",
    "yyyy-MM-dd HH:mm:ss.SSSSSSSSSZ||epoch_millis",
    "yyyy-MM-dd HH:mm:ssZ||epoch_millis",
    "yyyy-MM-dd'T'HH:mm:ss'Z'||epoch_millis",
    "yyyy-MM-dd'T'HH:mm:ss.SSSZ||epoch_millis",
    "yyyy-MM-dd'T'HH:mm:ss.SSS'Z'||epoch_millis",
];

/// Get the template body covering `patterns`.
///
/// The template includes:
/// - **Settings**: 3 primary shards, no replicas
/// - **Dynamic date formats**: millisecond to nanosecond layouts plus epoch millis
/// - **strings_as_keywords**: every detected string becomes a `keyword`
///
/// Backends up to version 6 require mappings scoped by document type, so
/// the mapping is nested under `doc_type` there.
pub fn template_body(patterns: &[String], version: u32, doc_type: &str) -> Value {
    let mappings = json!({
        "dynamic_date_formats": DYNAMIC_DATE_FORMATS,
        "dynamic_templates": [
            {
                "strings_as_keywords": {
                    "match_mapping_type": "string",
                    "mapping": {
                        "type": "keyword"
                    }
                }
            }
        ]
    });

    let mappings = if version <= 6 {
        json!({ doc_type: mappings })
    } else {
        mappings
    };

    json!({
        "index_patterns": patterns,
        "settings": {
            "number_of_replicas": 0,
            "number_of_shards": 3
        },
        "mappings": mappings
    })
}

/// Read the pattern list of template `name` from a `GET _template` response.
///
/// A missing template (an empty object) yields no patterns.
pub fn stored_patterns(response: &Value, name: &str) -> Vec<String> {
    response
        .get(name)
        .and_then(|template| template.get("index_patterns"))
        .and_then(Value::as_array)
        .map(|patterns| {
            patterns
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
