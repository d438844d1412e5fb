//! Bounded fan-out: runs one async operation per item with at most `limit`
//! operations in flight.
//!
//! Results come back in completion order. A failing item is just another
//! result; it never cancels its siblings.

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use tokio::sync::Semaphore;

pub const DEFAULT_CONCURRENCY: usize = 5;

pub async fn fan_out<I, T, F, Fut>(items: Vec<I>, limit: usize, op: F) -> Vec<T>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = T>,
{
    let semaphore = Semaphore::new(limit.max(1));
    let mut results = Vec::with_capacity(items.len());

    let mut in_flight: FuturesUnordered<_> = items
        .into_iter()
        .map(|item| {
            let semaphore = &semaphore;
            let operation = op(item);
            async move {
                // The semaphore is never closed, so the permit is always granted.
                let _permit = semaphore.acquire().await.ok();
                operation.await
            }
        })
        .collect();

    while let Some(result) = in_flight.next().await {
        results.push(result);
    }
    results
}
