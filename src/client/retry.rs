//! Exponential backoff for idempotent upstream calls.

use crate::BotError;
use std::future::Future;
use std::time::Duration;

/// Hard ceiling on attempts regardless of policy.
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Clamped to `1..=MAX_RETRY_ATTEMPTS`.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Attempts actually made.
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.clamp(1, MAX_RETRY_ATTEMPTS)
    }

    /// Delay after failed attempt `n` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// Only errors with [`BotError::is_transient`] are retried. The last error is
/// returned unchanged.
pub async fn retry_with_backoff<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, BotError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BotError>>,
{
    let attempts = policy.effective_attempts();
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn test_attempts_are_clamped() {
        let many = RetryPolicy {
            max_attempts: 50,
            ..Default::default()
        };
        assert_eq!(many.effective_attempts(), MAX_RETRY_ATTEMPTS);
        let none = RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(none.effective_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(RetryPolicy::default(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(BotError::upstream(Some(503), "busy"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BotError::Transport("connection reset".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BotError::upstream(Some(404), "no such license")) }
        })
        .await;
        assert!(matches!(result, Err(BotError::Upstream { status: Some(404), .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let start = tokio::time::Instant::now();
        let _: Result<(), _> = retry_with_backoff(RetryPolicy::default(), || async {
            Err(BotError::upstream(Some(500), "boom"))
        })
        .await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_body_not_retried() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result: Result<(), _> = retry_with_backoff(RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                crate::protocol::models::parse_single::<crate::protocol::models::RawLicense>(b"<html>")
                    .map(|_| ())
            }
        })
        .await;
        assert!(matches!(result, Err(BotError::Upstream { status: None, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credential_not_retried() {
        use crate::client::{HttpLicenseClient, LicenseApi};

        let client =
            HttpLicenseClient::with_settings("http://127.0.0.1:9", None, Duration::from_secs(1))
                .unwrap();
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result = retry_with_backoff(RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            client.revoke_license("lic_42")
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
