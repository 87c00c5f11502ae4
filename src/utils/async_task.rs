use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;
use crate::WatchError;

/// Runs `task` until it succeeds, retrying with a per-attempt timeout and
/// jittered exponential backoff.
///
/// `max_retries == 0` means retry forever. Exhaustion is reported as
/// `WatchError::RetryExhausted` naming `label`; the last underlying error is logged.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    label: &str,
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,
    T: std::future::Future<Output = Result<P>>,
{
    let mut attempts = 0;
    let mut delay = policy.base_delay();
    let mut last_error: Option<Error> = None;

    loop {
        attempts += 1;
        match timeout(policy.timeout(), task()).await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(error)) => {
                warn!(task = label, attempt = attempts, "failed with error: {}", error);
                last_error = Some(error);
            }
            Err(_) => {
                warn!(task = label, attempt = attempts, "timed out after {:?}", policy.timeout());
                last_error = Some(
                    WatchError::Timeout {
                        path: label.to_string(),
                        after: policy.timeout(),
                    }
                    .into(),
                );
            }
        }

        if policy.max_retries != 0 && attempts >= policy.max_retries {
            warn!(
                task = label,
                "task failed after {} attempts, last error: {:?}", attempts, last_error
            );
            return Err(WatchError::RetryExhausted {
                path: label.to_string(),
                attempts,
            }
            .into());
        }

        sleep(jittered(delay)).await;
        delay = std::cmp::min(delay * 2, policy.max_delay());
    }
}

/// Adds up to 10% random jitter
pub(crate) fn jittered(delay: Duration) -> Duration {
    let jitter_ms = (delay.as_millis() as u64) / 10;
    if jitter_ms == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
}
