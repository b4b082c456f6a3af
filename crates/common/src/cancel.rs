//! Cancellation helpers for outbound calls.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::Error;

/// Drive `fut` to completion unless `cancel` fires first.
///
/// Dropping the in-flight future aborts the underlying HTTP or DB call.
pub async fn run_cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_completes_when_not_cancelled() {
        let cancel = CancellationToken::new();
        let out = run_cancellable(&cancel, async { Ok::<_, Error>(7) }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_call() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let out = run_cancellable(&cancel, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, Error>(())
        })
        .await;
        assert!(out.unwrap_err().is_cancelled());
    }
}
