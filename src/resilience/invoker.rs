use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ResilienceConfig;
use crate::error::AiError;

/// Decides whether a failed call hit a rate limit or quota.
///
/// Backends report exhaustion differently (HTTP 429, gRPC `RESOURCE_EXHAUSTED`,
/// a phrase buried in the message), so the invoker takes this as a plug-in.
pub trait QuotaClassifier: Send + Sync {
    fn is_quota_exhausted(&self, error: &AiError) -> bool;
}

/// Default classifier: status code, numeric error code, or message marker.
#[derive(Debug, Clone)]
pub struct RateLimitClassifier {
    pub status_codes: Vec<u16>,
    pub error_codes: Vec<i64>,
    /// Lowercase substrings searched for in the error message.
    pub markers: Vec<String>,
}

impl Default for RateLimitClassifier {
    fn default() -> Self {
        Self {
            status_codes: vec![429],
            // 8 is gRPC RESOURCE_EXHAUSTED
            error_codes: vec![429, 8],
            markers: ["resource_exhausted", "quota", "rate limit", "too many requests"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl QuotaClassifier for RateLimitClassifier {
    fn is_quota_exhausted(&self, error: &AiError) -> bool {
        match error {
            AiError::QuotaExceeded { .. } => true,
            AiError::Remote {
                status,
                code,
                message,
            } => {
                if status.is_some_and(|s| self.status_codes.contains(&s)) {
                    return true;
                }
                if code.is_some_and(|c| self.error_codes.contains(&c)) {
                    return true;
                }
                let message = message.to_lowercase();
                self.markers.iter().any(|m| message.contains(m.as_str()))
            }
            AiError::MalformedResponse(_) | AiError::Unavailable(_) => false,
        }
    }
}

/// Retry budget and backoff base.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): `base * 2^retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs a remote call, retrying only quota-classified failures.
///
/// # Example
///
/// ```rust,no_run
/// use retouch_ai::resilience::{ResilientInvoker, RetryPolicy};
/// use retouch_ai::error::AiError;
///
/// # async fn example() {
/// let invoker = ResilientInvoker::new(RetryPolicy::default());
/// let result: Result<u32, AiError> = invoker.invoke(|| async { Ok(42) }).await;
/// assert_eq!(result.unwrap(), 42);
/// # }
/// ```
#[derive(Clone)]
pub struct ResilientInvoker {
    policy: RetryPolicy,
    classifier: Arc<dyn QuotaClassifier>,
}

impl ResilientInvoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            classifier: Arc::new(RateLimitClassifier::default()),
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(RetryPolicy {
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
        })
    }

    /// Replace the quota classifier for a backend with its own error shape.
    pub fn with_classifier(mut self, classifier: impl QuotaClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `operation`, retrying on quota exhaustion.
    ///
    /// Non-quota failures are returned unchanged after the first attempt.
    /// Once the retry budget is spent the result is
    /// [`AiError::QuotaExceeded`], never the backend's own error.
    pub async fn invoke<T, F, Fut>(&self, mut operation: F) -> Result<T, AiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AiError>>,
    {
        let mut retries = 0u32;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.classifier.is_quota_exhausted(&err) {
                return Err(err);
            }

            if retries >= self.policy.max_retries {
                log::warn!("Quota still exhausted after {} attempt(s): {err}", retries + 1);
                return Err(AiError::QuotaExceeded {
                    attempts: retries + 1,
                });
            }

            let delay = self.policy.delay_for(retries);
            retries += 1;
            log::warn!(
                "Rate limited ({err}). Retrying in {}ms ({}/{})",
                delay.as_millis(),
                retries,
                self.policy.max_retries
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    fn rate_limited() -> AiError {
        AiError::Remote {
            status: Some(429),
            code: None,
            message: "Too Many Requests".into(),
        }
    }

    // ── RateLimitClassifier ──────────────────────────────────────────

    #[test]
    fn classifies_status_code() {
        let c = RateLimitClassifier::default();
        assert!(c.is_quota_exhausted(&rate_limited()));
        assert!(!c.is_quota_exhausted(&AiError::Remote {
            status: Some(500),
            code: None,
            message: "boom".into(),
        }));
    }

    #[test]
    fn classifies_error_code() {
        let c = RateLimitClassifier::default();
        assert!(c.is_quota_exhausted(&AiError::Remote {
            status: None,
            code: Some(8),
            message: String::new(),
        }));
    }

    #[test]
    fn classifies_message_marker_case_insensitively() {
        let c = RateLimitClassifier::default();
        assert!(c.is_quota_exhausted(&AiError::transport("RESOURCE_EXHAUSTED: try later")));
        assert!(c.is_quota_exhausted(&AiError::transport("You exceeded your current Quota")));
        assert!(!c.is_quota_exhausted(&AiError::transport("connection reset")));
        assert!(!c.is_quota_exhausted(&AiError::MalformedResponse("quota".into())));
    }

    #[test]
    fn numbers_in_message_are_not_markers() {
        let c = RateLimitClassifier::default();
        let err = AiError::Remote {
            status: Some(400),
            code: Some(400),
            message: "image 4290x1429 exceeds 4294967 bytes".into(),
        };
        assert!(!c.is_quota_exhausted(&err));
        assert!(c.is_quota_exhausted(&AiError::transport("429 Too Many Requests")));
    }

    #[test]
    fn retry_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(8000));
    }

    // ── invoke ───────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn persistent_quota_failure_makes_three_attempts() {
        let invoker = ResilientInvoker::new(RetryPolicy::default());
        let calls: Mutex<Vec<Instant>> = Mutex::new(Vec::new());

        let result: Result<(), AiError> = invoker
            .invoke(|| {
                calls.lock().push(Instant::now());
                async { Err(rate_limited()) }
            })
            .await;

        assert!(matches!(result, Err(AiError::QuotaExceeded { attempts: 3 })));

        let calls = calls.lock();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_millis(2000));
        assert_eq!(calls[2] - calls[1], Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_is_not_delayed() {
        let invoker = ResilientInvoker::new(RetryPolicy::default());
        let start = Instant::now();
        let value = invoker.invoke(|| async { Ok::<_, AiError>(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn non_quota_failure_propagates_without_retry() {
        let invoker = ResilientInvoker::new(RetryPolicy::default());
        let calls = Mutex::new(0u32);

        let result: Result<(), AiError> = invoker
            .invoke(|| {
                *calls.lock() += 1;
                async { Err(AiError::transport("connection reset")) }
            })
            .await;

        assert_eq!(*calls.lock(), 1);
        match result {
            Err(AiError::Remote { message, .. }) => assert_eq!(message, "connection reset"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_when_quota_clears() {
        let invoker = ResilientInvoker::new(RetryPolicy::default());
        let calls = Mutex::new(0u32);

        let result = invoker
            .invoke(|| {
                let n = {
                    let mut calls = calls.lock();
                    *calls += 1;
                    *calls
                };
                async move {
                    if n < 2 {
                        Err(rate_limited())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(*calls.lock(), 2);
    }

    struct NeverQuota;

    impl QuotaClassifier for NeverQuota {
        fn is_quota_exhausted(&self, _error: &AiError) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn custom_classifier_overrides_default() {
        let invoker = ResilientInvoker::new(RetryPolicy::default()).with_classifier(NeverQuota);
        let calls = Mutex::new(0u32);

        let result: Result<(), AiError> = invoker
            .invoke(|| {
                *calls.lock() += 1;
                async { Err(rate_limited()) }
            })
            .await;

        assert_eq!(*calls.lock(), 1);
        assert!(matches!(result, Err(AiError::Remote { status: Some(429), .. })));
    }
}
