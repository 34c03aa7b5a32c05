//! Bounded worker pool over an arbitrary async function.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Run `f` over every item with at most `limit` calls in flight.
///
/// Results come back in input order regardless of completion order. A
/// `limit` of zero is treated as one.
pub async fn bounded_map<I, F, Fut, T>(items: I, limit: usize, f: F) -> Vec<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(items)
        .map(f)
        .buffered(limit.max(1))
        .collect()
        .await
}
