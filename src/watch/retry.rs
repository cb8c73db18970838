use crate::error::{KiadisaError, KiadisaResult};
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff: retry `n` (0-based) waits `backoff_base * 2^n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Race `fut` against a deadline; the losing fetch is dropped
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> KiadisaResult<T>
where
    F: Future<Output = KiadisaResult<T>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| KiadisaError::Timeout(deadline))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_wins_against_stalled_future() {
        let start = tokio::time::Instant::now();
        let result: KiadisaResult<()> =
            with_deadline(Duration::from_secs(10), std::future::pending()).await;

        assert_eq!(result, Err(KiadisaError::Timeout(Duration::from_secs(10))));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed <= Duration::from_millis(10_001));
    }

    #[tokio::test]
    async fn test_deadline_passes_through_results() {
        let ok = with_deadline(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: KiadisaResult<u8> = with_deadline(Duration::from_secs(1), async {
            Err(KiadisaError::Backend("boom".into()))
        })
        .await;
        assert_eq!(err, Err(KiadisaError::Backend("boom".into())));
    }
}
