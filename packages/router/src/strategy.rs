//! How the loaders and actions of a navigation are scheduled.

use futures_util::{
    future::{FutureExt, LocalBoxFuture},
    stream::{FuturesUnordered, StreamExt},
};

use crate::{DataOutcome, DataResult};

/// A scheduled loader or action call.
///
/// The future already resolves the lazy part of the route and falls back to the right default
/// when the route has no loader.
pub struct DataCall {
    /// The route the call belongs to.
    pub route_id: String,
    /// The call.
    pub future: LocalBoxFuture<'static, DataResult>,
}

impl std::fmt::Debug for DataCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataCall")
            .field("route_id", &self.route_id)
            .finish_non_exhaustive()
    }
}

/// Runs the calls of a navigation, fetcher or revalidation.
///
/// A strategy may return fewer results than it got calls, e.g. when it stops at a redirect. Calls
/// without a result are treated as cancelled.
pub trait DataStrategy {
    /// Run `calls`, returning every result by route id.
    fn run(&self, calls: Vec<DataCall>) -> LocalBoxFuture<'static, Vec<(String, DataResult)>>;
}

fn is_redirect(result: &DataResult) -> bool {
    matches!(result, Ok(DataOutcome::Redirect(_)))
}

/// Run every call concurrently. The first redirect drops the calls that are still running.
///
/// This is the default.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParallelDataStrategy;

impl DataStrategy for ParallelDataStrategy {
    fn run(&self, calls: Vec<DataCall>) -> LocalBoxFuture<'static, Vec<(String, DataResult)>> {
        async move {
            let mut pending: FuturesUnordered<_> = calls
                .into_iter()
                .map(|call| {
                    let DataCall { route_id, future } = call;
                    future.map(move |result| (route_id, result))
                })
                .collect();

            let mut results = Vec::with_capacity(pending.len());
            while let Some((route_id, result)) = pending.next().await {
                let redirect = is_redirect(&result);
                results.push((route_id, result));
                if redirect {
                    break;
                }
            }
            results
        }
        .boxed_local()
    }
}

/// Run the calls one after the other, root first, stopping at the first redirect.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialDataStrategy;

impl DataStrategy for SequentialDataStrategy {
    fn run(&self, calls: Vec<DataCall>) -> LocalBoxFuture<'static, Vec<(String, DataResult)>> {
        async move {
            let mut results = Vec::with_capacity(calls.len());
            for DataCall { route_id, future } in calls {
                let result = future.await;
                let redirect = is_redirect(&result);
                results.push((route_id, result));
                if redirect {
                    break;
                }
            }
            results
        }
        .boxed_local()
    }
}
