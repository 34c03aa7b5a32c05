//! Lazy chunking for batched writes.
//!
//! Both clients draw at most `batch_size` items at a time from the caller's
//! sequence and send one request per chunk, strictly in order. An empty
//! chunk is never produced, so an exhausted source never turns into an
//! empty bulk body.

use std::time::Duration;

use crate::errors::StoreError;

/// Default number of records per write request.
pub const DEFAULT_WRITE_BATCH_SIZE: usize = 10_000;

/// Options for a batched write.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Maximum number of records per request.
    pub batch_size: usize,
    /// Per request timeout. `None` uses the connection default.
    pub timeout: Option<Duration>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_WRITE_BATCH_SIZE,
            timeout: None,
        }
    }
}

impl WriteOptions {
    /// Create options with a custom batch size.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Default::default()
        }
    }

    /// Set the per request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Summary of a completed batched write.
///
/// Chunks are not rolled back when a later chunk fails, so a write that
/// returns an error may still have applied its earlier chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Number of write requests issued.
    pub chunks: usize,
    /// Number of records sent.
    pub records: usize,
    /// Per-item failures reported inside otherwise successful responses.
    pub item_errors: usize,
}

/// Iterator yielding non-empty chunks of at most `size` items.
#[derive(Debug)]
pub struct Chunks<I> {
    iter: I,
    size: usize,
}

impl<I: Iterator> Iterator for Chunks<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk: Vec<I::Item> = self.iter.by_ref().take(self.size).collect();
        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}

/// Split `items` lazily into chunks of `size`.
///
/// # Returns
///
/// * `Err(StoreError::ValidationError)` - If `size` is zero
pub fn chunks<I: IntoIterator>(items: I, size: usize) -> Result<Chunks<I::IntoIter>, StoreError> {
    if size == 0 {
        return Err(StoreError::validation("batch_size must be greater than zero"));
    }

    Ok(Chunks {
        iter: items.into_iter(),
        size,
    })
}
