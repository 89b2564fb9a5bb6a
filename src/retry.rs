use std::future::Future;
use tracing::warn;

use crate::error::{GbqError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Retry only errors where [`GbqError::is_transient`] holds.
    #[default]
    TransientOnly,
    /// Retry every failure.
    Always,
}

impl RetryPolicy {
    pub fn should_retry(&self, err: &GbqError) -> bool {
        match self {
            RetryPolicy::TransientOnly => err.is_transient(),
            RetryPolicy::Always => true,
        }
    }
}

/// Runs `op` up to `max_tries` times in total. Returns the value together with
/// the attempt that produced it; the last error is returned unchanged.
pub async fn run_with_retry<T, F, Fut>(max_tries: u32, policy: RetryPolicy, mut op: F) -> Result<(T, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if max_tries == 0 {
        return Err(GbqError::Configuration("max_tries must be at least 1".to_string()));
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok((value, attempt)),
            Err(e) if attempt < max_tries && policy.should_retry(&e) => {
                warn!("run_with_retry error, trying again {}/{}: {}", attempt, max_tries, e);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> GbqError {
        GbqError::generic("backendError", "try later")
    }

    #[test]
    fn test_succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let op = move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok("done")
            }
        };
        let result = tokio_test::block_on(run_with_retry(3, RetryPolicy::TransientOnly, op));

        assert_eq!(result.unwrap(), ("done", 3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let op = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        };
        let result: Result<((), u32)> =
            tokio_test::block_on(run_with_retry(3, RetryPolicy::TransientOnly, op));

        assert!(result.unwrap_err().to_string().contains("backendError"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_transient_only_stops_on_schema_error() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let op = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(GbqError::InvalidSchema("mismatch".into()))
        };
        let result: Result<((), u32)> =
            tokio_test::block_on(run_with_retry(5, RetryPolicy::TransientOnly, op));

        assert!(matches!(result, Err(GbqError::InvalidSchema(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_always_retries_everything() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let op = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(GbqError::InvalidSchema("mismatch".into()))
        };
        let result: Result<((), u32)> =
            tokio_test::block_on(run_with_retry(4, RetryPolicy::Always, op));

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_zero_budget_rejected() {
        let result: Result<((), u32)> =
            tokio_test::block_on(run_with_retry(0, RetryPolicy::Always, || async { Ok(()) }));
        assert!(matches!(result, Err(GbqError::Configuration(_))));
    }
}
