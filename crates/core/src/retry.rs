//! Bounded exponential-backoff retry for single network operations.
//!
//! Used for object-store uploads and downloads. Each attempt runs under
//! its own timeout so one hung request cannot eat the whole budget.
//! Failures are classified through [`Retryable`]; anything that is not
//! retryable is returned after the attempt that produced it.

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use tokio_util::sync::CancellationToken;

/// Network error signatures that indicate a transient condition.
const TRANSIENT_PATTERN: &str = r"(?i)timeout|timed out|deadline exceeded|connection reset|connection refused|\beof\b|broken pipe";

static TRANSIENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TRANSIENT_PATTERN).expect("valid regex"));

/// HTTP statuses worth another attempt: request timeout, rate limit and
/// the gateway family.
const RETRYABLE_STATUSES: [u16; 5] = [408, 429, 502, 503, 504];

/// Whether an error message carries one of the transient network signatures.
pub fn is_transient_message(message: &str) -> bool {
    TRANSIENT_RE.is_match(message)
}

/// Whether an HTTP status code should be retried.
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Classification hook for errors passed through [`retry`].
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Tunable parameters for the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on the un-jittered delay.
    pub max_delay: Duration,
    /// Maximum extra delay as a fraction of the computed delay.
    pub jitter: f64,
    /// Wall-clock limit for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Policy for object uploads (180 s per attempt).
    pub fn upload() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(180),
            ..Default::default()
        }
    }

    /// Policy for object downloads (120 s per attempt).
    pub fn download() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(120),
            ..Default::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Un-jittered delay before retry number `retry` (1-based):
    /// `base * 2^(retry-1)`, clamped to `max_delay`.
    pub fn base_backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// [`base_backoff`](Self::base_backoff) plus up to `jitter` of extra delay.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let delay = self.base_backoff(retry);
        if self.jitter <= 0.0 {
            return delay;
        }
        let fraction = rand::rng().random_range(0.0..=self.jitter);
        delay + delay.mul_f64(fraction)
    }
}

/// Why one attempt did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError<E> {
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),

    #[error("{0}")]
    Failed(E),
}

/// Terminal outcome of a failed [`retry`] loop.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("non-retryable failure on attempt {attempt}: {source}")]
    Fatal {
        attempt: u32,
        #[source]
        source: E,
    },

    #[error("failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: AttemptError<E>,
    },

    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    /// Number of attempts that were actually started.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempt, .. } => *attempt,
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts } => {
                *attempts
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }
}

/// Run `attempt_fn` until it succeeds, fails fatally, or the policy is
/// exhausted.
///
/// `attempt_fn` receives the 1-based attempt number. Timed-out attempts
/// count as retryable. Cancellation is observed during attempts and
/// during backoff sleeps.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut attempt_fn: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RetryError::Cancelled { attempts: attempt - 1 });
            }
            result = tokio::time::timeout(policy.attempt_timeout, attempt_fn(attempt)) => result,
        };

        let error = match outcome {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    tracing::debug!(operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(e)) if !e.is_retryable() => {
                return Err(RetryError::Fatal { attempt, source: e });
            }
            Ok(Err(e)) => AttemptError::Failed(e),
            Err(_) => AttemptError::TimedOut(policy.attempt_timeout),
        };

        if attempt >= max_attempts {
            tracing::error!(operation, attempts = attempt, error = %error, "Retries exhausted");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                source: error,
            });
        }

        let delay = policy.backoff_delay(attempt);
        tracing::warn!(
            operation,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient failure, retrying",
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
