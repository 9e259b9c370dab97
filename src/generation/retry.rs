use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::metrics::ANALYSIS_RETRIES;

/// Fixed-delay retry for image analysis
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// `None` retries until the call succeeds
    pub max_attempts: Option<u32>,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: Option<u32>, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `op` until it succeeds or the attempt limit is reached.
    ///
    /// `op` receives the 1-based attempt number. Every failure is logged with
    /// it; the last error is returned once attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if self.max_attempts.is_some_and(|max| attempt >= max) => {
                    warn!(attempt, "{} failed, giving up: {:#}", label, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(attempt, "{} failed: {:#}", label, e);
                    info!("Retrying {} in {:?}", label, self.delay);
                    ANALYSIS_RETRIES.inc();
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(None, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let value = policy
            .run("op", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(anyhow!("flaky"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_at_limit() {
        let policy = RetryPolicy::new(Some(2), Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run("op", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow!("down")) }
            })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "down");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
