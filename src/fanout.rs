//! Concurrent map-then-join
//!
//! Used wherever independent items (episode rows, mirror candidates,
//! resolved hosts) are processed in parallel and the caller waits for all
//! of them. Results come back in input order; completion order is not
//! observable through this API.

use futures::stream::{self, StreamExt};
use std::future::Future;

/// Most futures a single fan-out keeps in flight
pub const FAN_OUT_LIMIT: usize = 16;

/// Run `f` over every item concurrently and collect the results
pub async fn fan_out<I, T, F, Fut, R>(items: I, f: F) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items)
        .map(f)
        .buffered(FAN_OUT_LIMIT)
        .collect()
        .await
}

/// Split fan-out results into successes and failures, each in input order
pub fn partition_results<T, E>(results: Vec<Result<T, E>>) -> (Vec<T>, Vec<E>) {
    let mut ok = Vec::new();
    let mut err = Vec::new();
    for result in results {
        match result {
            Ok(value) => ok.push(value),
            Err(e) => err.push(e),
        }
    }
    (ok, err)
}
