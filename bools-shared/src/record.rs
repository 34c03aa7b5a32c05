//! The record type exchanged with the store clients.

use serde_json::{Map, Value};

/// An opaque key-value mapping supplied by (or returned to) the caller.
///
/// Field order is preserved so rendered bulk lines and line-protocol points
/// follow the caller's column order.
pub type Record = Map<String, Value>;

/// Whether a value counts as missing and should be left out of a write.
pub fn is_missing(value: &Value) -> bool {
    value.is_null()
}
