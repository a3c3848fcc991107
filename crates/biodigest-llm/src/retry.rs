//! Bounded retry with exponential backoff, and the deterministic fallback
//! verdict used once retries are exhausted.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use biodigest_common::ClassifierVerdict;

/// Relevance assigned to a paper whose classification failed.
pub const FALLBACK_RELEVANCE: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts; for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, base_delay_ms: 0, max_delay_ms: 0 }
    }

    /// Wait before attempt `attempt + 1`, where `attempt` counts from 1:
    /// base, 2×base, 4×base, … capped at `max_delay_ms`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(32);
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Run `op` until it succeeds, returns a non-retryable error, or the
    /// attempt budget is spent. The last error is returned on failure.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F, retryable: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < attempts && retryable(&e) => {
                    let delay = self.delay_after(attempt);
                    warn!(%label, attempt, max_attempts = attempts, delay_ms = delay.as_millis() as u64, error = %e, "Retrying");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Verdict for a paper whose classification could not be obtained. The paper
/// stays visible (`keep = true`) at a low score, carrying the error.
pub fn fallback_verdict(error: &str) -> ClassifierVerdict {
    ClassifierVerdict {
        keep: true,
        relevance_score: FALLBACK_RELEVANCE,
        why_it_matters: format!("Classification failed: {error}"),
        summary: "Classification error - marked for review".to_string(),
        error: Some(error.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_schedule() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_after(1), Duration::from_secs(2));
        assert_eq!(p.delay_after(2), Duration::from_secs(4));
        assert_eq!(p.delay_after(3), Duration::from_secs(8));
        assert_eq!(p.delay_after(4), Duration::from_secs(10));
        assert_eq!(p.delay_after(60), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let out: Result<u32, String> = RetryPolicy::immediate(3)
            .run("t", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(format!("fail {n}")) } else { Ok(n) }
            }, |_| true)
            .await;
        assert_eq!(out, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_at_budget() {
        let calls = AtomicU32::new(0);
        let out: Result<(), String> = RetryPolicy::immediate(3)
            .run("t", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            }, |_| true)
            .await;
        assert_eq!(out, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);
        let out: Result<(), String> = RetryPolicy::immediate(3)
            .run("t", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("malformed".to_string())
            }, |_| false)
            .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fallback_verdict() {
        let v = fallback_verdict("timeout");
        assert!(v.keep);
        assert_eq!(v.relevance_score, FALLBACK_RELEVANCE);
        assert_eq!(v.error.as_deref(), Some("timeout"));
        assert!(v.buckets.is_empty());
    }
}
