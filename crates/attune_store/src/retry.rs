//! Bounded retry over storage open + operation.
//!
//! Quota failures fail fast. Everything else is retried on the configured
//! schedule with jittered delays, then surfaced as a storage error.

use crate::store::{KeyedStoreError, StoreCode};
use attune_core::config::RetryScheduleConfig;
use attune_core::AttuneError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Delay before the given 1-indexed attempt, jitter applied.
fn delay_for_attempt(schedule: &RetryScheduleConfig, attempt: u32) -> Duration {
    let base_ms = schedule
        .delays_ms
        .get(attempt as usize - 1)
        .copied()
        .or_else(|| schedule.delays_ms.last().copied())
        .unwrap_or(0);
    if base_ms == 0 {
        return Duration::ZERO;
    }
    let jitter = schedule.jitter_fraction.clamp(0.0, 1.0);
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
    Duration::from_millis((base_ms as f64 * factor).max(0.0) as u64)
}

/// Run `operation` under the schedule. The operation is expected to open
/// the store and perform one keyed operation.
pub async fn with_retry<T, F, Fut>(
    schedule: &RetryScheduleConfig,
    label: &str,
    operation: F,
) -> Result<T, AttuneError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, KeyedStoreError>>,
{
    let max_attempts = schedule.max_attempts.max(1);
    let mut last_error: Option<KeyedStoreError> = None;

    for attempt in 1..=max_attempts {
        let delay = delay_for_attempt(schedule, attempt);
        if !delay.is_zero() {
            tracing::debug!(%label, attempt, delay_ms = delay.as_millis() as u64, "retry backoff");
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(%label, attempt, "storage operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.code == StoreCode::QuotaExceeded => {
                tracing::warn!(%label, error = %e, "quota exceeded, not retrying");
                return Err(AttuneError::StorageQuota);
            }
            Err(e) => {
                tracing::warn!(
                    %label,
                    attempt,
                    max_attempts,
                    error = %e,
                    "storage operation failed"
                );
                last_error = Some(e);
            }
        }
    }

    Err(AttuneError::Storage(format!(
        "{}: {} attempts exhausted, last error: {}",
        label,
        max_attempts,
        last_error.map(|e| e.to_string()).unwrap_or_else(|| "unknown".to_string())
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use attune_core::config::RetryScheduleConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn schedule() -> RetryScheduleConfig {
        RetryScheduleConfig::default()
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&schedule(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, KeyedStoreError>(42)
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&schedule(), "test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(KeyedStoreError::aborted("flaky"))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_storage_error() {
        let calls = AtomicU32::new(0);
        let err = with_retry(&schedule(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(KeyedStoreError::aborted("always down"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AttuneError::Storage(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("always down"));
    }

    #[tokio::test]
    async fn test_quota_fails_fast_without_retry() {
        let calls = AtomicU32::new(0);
        let err = with_retry(&schedule(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(KeyedStoreError::quota("disk full"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AttuneError::StorageQuota));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_respect_schedule_bounds() {
        let start = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);
        let _ = with_retry(&schedule(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(KeyedStoreError::aborted("down"))
        })
        .await;
        let elapsed = start.elapsed();
        // Base delays 0 + 50 + 200 with +/- 25% jitter on the non-zero ones.
        assert!(elapsed >= Duration::from_millis(187), "elapsed {:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(313), "elapsed {:?}", elapsed);
    }
}
