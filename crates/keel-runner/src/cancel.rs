//! Cancellation plumbing for store calls.

use crate::error::{RunnerError, RunnerResult};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Race `call` against `cancel`.
///
/// Returns the store call's own result wrapped in `Ok`, or `Cancelled` if the
/// token fired first. An already-cancelled token wins without polling `call`.
pub(crate) async fn guarded<T, F>(
    cancel: &CancellationToken,
    schema: &str,
    call: F,
) -> RunnerResult<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunnerError::Cancelled {
            schema: schema.to_string(),
        }),
        result = call => Ok(result),
    }
}
