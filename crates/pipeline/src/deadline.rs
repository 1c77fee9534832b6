//! Per-call time limits for external collaborators.

use faqroute_core::{AppError, AppResult};
use std::future::Future;
use std::time::Duration;

/// Run `call`, failing with `AppError::Timeout` once `limit` elapses.
pub async fn within<T, F>(limit: Duration, what: &str, call: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout {
            what: what.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_result_through() {
        let value = within(Duration::from_secs(1), "noop", async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_times_out() {
        let result: AppResult<()> = within(Duration::from_millis(10), "sleeper", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(AppError::Timeout { what, .. }) => assert_eq!(what, "sleeper"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
