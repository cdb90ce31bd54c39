//! Delivery channel abstraction and retry policy.
//!
//! A channel sends one rendered message to one address and reports what
//! happened. It never returns an error: transport problems are retried when
//! they look transient and otherwise reported in [`SendReport::error`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// An inline link button attached below a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkButton {
    pub text: String,
    pub url: String,
}

/// A rendered message with an optional single row of link buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub buttons: Vec<LinkButton>,
}

impl OutgoingMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_button(mut self, text: impl Into<String>, url: impl Into<String>) -> Self {
        self.buttons.push(LinkButton {
            text: text.into(),
            url: url.into(),
        });
        self
    }
}

/// Result of delivering one message, after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub delivered: bool,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Error from a single send attempt, classified for the retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// DNS, timeout, connection reset, or a 429/5xx gateway answer.
    #[error("{0}")]
    Retryable(String),

    /// Anything that will fail the same way again.
    #[error("{0}")]
    Terminal(String),
}

/// A delivery channel, e.g. the Telegram Bot API.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send(&self, address: &str, message: &OutgoingMessage) -> SendReport;
}

/// HTTP statuses worth retrying.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<F, Fut>(&self, mut op: F) -> SendReport
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), SendError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(()) => {
                    return SendReport {
                        delivered: true,
                        attempts: attempt,
                        error: None,
                    };
                }
                Err(SendError::Retryable(detail)) if attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %detail,
                        "Delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return SendReport {
                        delivered: false,
                        attempts: attempt,
                        error: Some(err.to_string()),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays scripted attempt results and counts calls.
    struct Script {
        results: Mutex<Vec<Result<(), SendError>>>,
        calls: Mutex<u32>,
    }

    impl Script {
        fn new(mut results: Vec<Result<(), SendError>>) -> Self {
            results.reverse();
            Self {
                results: Mutex::new(results),
                calls: Mutex::new(0),
            }
        }

        async fn attempt(&self) -> Result<(), SendError> {
            *self.calls.lock().unwrap() += 1;
            self.results.lock().unwrap().pop().unwrap_or(Ok(()))
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    fn unavailable() -> Result<(), SendError> {
        Err(SendError::Retryable("HTTP 503 Service Unavailable".into()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures_with_backoff() {
        let script = Script::new(vec![unavailable(), unavailable(), Ok(())]);
        let started = tokio::time::Instant::now();

        let report = RetryPolicy::default().run(|_| script.attempt()).await;

        assert!(report.delivered);
        assert_eq!(report.attempts, 3);
        assert_eq!(report.error, None);
        assert_eq!(script.calls(), 3);
        // 1s after the first failure, 2s after the second.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_is_not_retried() {
        let script = Script::new(vec![Err(SendError::Terminal(
            "HTTP 400 Bad Request: chat not found".into(),
        ))]);
        let started = tokio::time::Instant::now();

        let report = RetryPolicy::default().run(|_| script.attempt()).await;

        assert!(!report.delivered);
        assert_eq!(report.attempts, 1);
        assert_eq!(script.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(report.error.unwrap().contains("chat not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let script = Script::new(vec![unavailable(), unavailable(), unavailable(), Ok(())]);

        let report = RetryPolicy::default().run(|_| script.attempt()).await;

        assert!(!report.delivered);
        assert_eq!(report.attempts, 3);
        assert_eq!(script.calls(), 3);
        assert_eq!(report.error.as_deref(), Some("HTTP 503 Service Unavailable"));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn test_status_classification() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "{} should retry", status);
        }
        for status in [400, 401, 403, 404, 501] {
            assert!(!is_retryable_status(status), "{} should not retry", status);
        }
    }
}
