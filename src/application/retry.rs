use crate::error::{LedgerError, Result};
use std::future::Future;

/// How many times a request that lost an optimistic-concurrency race is re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Runs `op` until it returns anything other than `VersionConflict`, or the
/// retry budget is spent.
///
/// Each attempt must re-read the case itself; the closure is called afresh.
pub async fn retry_on_conflict<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Err(LedgerError::VersionConflict { case, expected, actual })
                if retries < policy.max_retries =>
            {
                retries += 1;
                tracing::warn!(%case, expected, actual, retries, "version conflict, retrying");
                tokio::task::yield_now().await;
            }
            other => return other,
        }
    }
}
