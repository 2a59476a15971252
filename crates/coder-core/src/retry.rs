//! LLM retry harness
//!
//! Exponential backoff (`base * 2^attempt`) with substring error
//! classification. Cancellation is observed during the call and during
//! every backoff wait.

use crate::collaborators::LlmClient;
use crate::error::GenerationError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TERMINAL_PATTERNS: &[&str] = &["unauthorized", "forbidden", "invalid api key", "401", "403"];

const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "connection",
    "network",
    "temporary",
    "rate limit",
    "503",
    "502",
    "429",
    "context deadline exceeded",
];

/// How an LLM error is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Known transient failure
    Retryable,
    /// Auth or permission failure; never retried
    Terminal,
    /// Unrecognised; retried
    Unknown,
}

impl ErrorClass {
    /// False only for terminal errors
    #[inline]
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Terminal)
    }
}

/// Classify an error by case-insensitive substring match
#[must_use]
pub fn classify_error(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    if TERMINAL_PATTERNS.iter().any(|p| lower.contains(p)) {
        ErrorClass::Terminal
    } else if RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p)) {
        ErrorClass::Retryable
    } else {
        ErrorClass::Unknown
    }
}

/// Attempt bound and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least one
    pub max_attempts: u32,
    /// First backoff delay; doubled per retry
    pub base: Duration,
}

impl RetryPolicy {
    /// Policy with at least one attempt
    #[must_use]
    pub fn new(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
        }
    }

    /// Wait after the failed attempt with zero-based index `attempt`
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Call the LLM until it answers, fails terminally, or attempts run out
///
/// # Errors
/// - `GenerationError::Terminal` on a non-retryable error
/// - `GenerationError::Exhausted` after `max_attempts` retryable failures
/// - `GenerationError::Cancelled` when `cancel` fires
pub async fn complete_with_retry(
    llm: &dyn LlmClient,
    system: &str,
    user: &str,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String, GenerationError> {
    let mut last_error = String::new();

    for attempt in 0..policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(GenerationError::Cancelled),
            result = llm.complete(system, user) => result,
        };

        match result {
            Ok(response) => {
                tracing::debug!(attempt = attempt + 1, bytes = response.len(), "LLM responded");
                return Ok(response);
            }
            Err(e) => {
                let message = e.to_string();
                let class = classify_error(&message);
                if !class.is_retryable() {
                    tracing::warn!(attempt = attempt + 1, error = %message, "terminal LLM error");
                    return Err(GenerationError::Terminal { message });
                }
                tracing::warn!(attempt = attempt + 1, ?class, error = %message, "LLM call failed");
                last_error = message;
            }
        }

        if attempt + 1 < policy.max_attempts {
            let delay = policy.delay(attempt);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(GenerationError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    Err(GenerationError::Exhausted {
        attempts: policy.max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for Scripted {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::new("network unreachable")))
        }
    }

    #[test]
    fn classification() {
        assert_eq!(classify_error("HTTP 401 Unauthorized"), ErrorClass::Terminal);
        assert_eq!(classify_error("Invalid API key provided"), ErrorClass::Terminal);
        assert_eq!(classify_error("403"), ErrorClass::Terminal);
        assert_eq!(classify_error("Rate Limit exceeded (429)"), ErrorClass::Retryable);
        assert_eq!(classify_error("context deadline exceeded"), ErrorClass::Retryable);
        assert_eq!(classify_error("something odd"), ErrorClass::Unknown);
        assert!(ErrorClass::Unknown.is_retryable());
    }

    #[test]
    fn delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_succeeds() {
        let llm = Scripted::new(vec![
            Err(LlmError::new("503 service unavailable")),
            Err(LlmError::new("connection reset")),
            Ok("done".into()),
        ]);
        let start = tokio::time::Instant::now();
        let out = complete_with_retry(&llm, "s", "u", RetryPolicy::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out, "done");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_stops_immediately() {
        let llm = Scripted::new(vec![Err(LlmError::new("401 unauthorized"))]);
        let err = complete_with_retry(&llm, "s", "u", RetryPolicy::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Terminal { .. }));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let llm = Scripted::new(Vec::new());
        let err = complete_with_retry(&llm, "s", "u", RetryPolicy::new(2, Duration::from_millis(10)), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::Exhausted {
                attempts: 2,
                last_error: "network unreachable".into()
            }
        );
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff() {
        let llm = Scripted::new(Vec::new());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = complete_with_retry(&llm, "s", "u", RetryPolicy::default(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Cancelled);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn already_cancelled_never_calls() {
        let llm = Scripted::new(vec![Ok("x".into())]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = complete_with_retry(&llm, "s", "u", RetryPolicy::default(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Cancelled);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }
}
