//! JSON-lines reader.
//!
//! Each non-empty line must hold one JSON object. Lines that fail to decode
//! are logged and skipped so one bad line does not sink an import.

use std::path::Path;

use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::BoolsError;
use bools_shared::Record;

/// Read every decodable record from a JSON-lines file.
pub async fn read_records(path: impl AsRef<Path>, verbose: bool) -> Result<Vec<Record>, BoolsError> {
    let file = File::open(path.as_ref()).await?;
    parse_records(BufReader::new(file), verbose).await
}

/// Decode records from any buffered reader.
///
/// With `verbose`, each skipped line is reported with its 0-based index.
pub async fn parse_records<R>(reader: R, verbose: bool) -> Result<Vec<Record>, BoolsError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut records = Vec::new();
    let mut skipped = 0usize;
    let mut index = 0usize;

    while let Some(line) = lines.next_line().await? {
        let current = index;
        index += 1;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(&line) {
            Ok(Value::Object(record)) => records.push(record),
            Ok(_) => {
                skipped += 1;
                if verbose {
                    warn!(line = current, "Skipping line that is not a JSON object");
                }
            }
            Err(e) => {
                skipped += 1;
                if verbose {
                    warn!(line = current, error = %e, "Skipping undecodable line");
                }
            }
        }
    }

    if skipped > 0 {
        warn!(skipped = skipped, "Some lines could not be decoded");
    }
    debug!(records = records.len(), "Read JSON lines");

    Ok(records)
}
