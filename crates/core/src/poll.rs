//! Submit-once, poll-until-done waiting for long-running provider jobs.
//!
//! The protocol is: submit and receive an operation id, sit out a grace
//! period, then poll with a growing interval until the operation
//! completes, fails, or the wall-clock deadline (measured from
//! submission) passes. Cancellation is honoured at every wait.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Timing parameters for [`submit_and_poll`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Wait between submission and the first poll.
    pub initial_delay: Duration,
    /// Interval after the first pending poll.
    pub min_interval: Duration,
    /// Upper bound on the interval between polls.
    pub max_interval: Duration,
    /// Factor by which the interval grows after each pending poll.
    pub multiplier: f64,
    /// Hard deadline measured from submission.
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(15),
            min_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(20),
            multiplier: 1.5,
            max_wait: Duration::from_secs(5 * 60),
        }
    }
}

/// Grow the poll interval by the configured multiplier, clamped to
/// [`PollConfig::max_interval`].
pub fn next_interval(current: Duration, config: &PollConfig) -> Duration {
    current.mul_f64(config.multiplier).min(config.max_interval)
}

/// Classified result of one status check.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    Pending,
    Completed(T),
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    #[error("submission failed: {0}")]
    Submit(E),

    #[error("status check {polls} for operation {operation_id} failed: {source}")]
    Poll {
        operation_id: String,
        polls: u32,
        source: E,
    },

    #[error("operation {operation_id} failed: {reason}")]
    Failed { operation_id: String, reason: String },

    #[error("operation {operation_id} did not complete within {max_wait:?} ({polls} polls)")]
    TimedOut {
        operation_id: String,
        max_wait: Duration,
        polls: u32,
    },

    #[error("wait cancelled")]
    Cancelled,
}

impl<E> PollError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::TimedOut { .. })
    }
}

/// Sleep until `wake` unless `cancel` fires first. Returns `false` on
/// cancellation.
async fn sleep_until(cancel: &CancellationToken, wake: Instant) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep_until(wake) => true,
    }
}

/// Submit an operation and wait for its result.
///
/// `submit` is called exactly once. `poll` receives the operation id and
/// is called until it reports completion or failure. A poll that errors
/// ends the wait immediately.
pub async fn submit_and_poll<T, E, S, SFut, P, PFut>(
    config: &PollConfig,
    cancel: &CancellationToken,
    submit: S,
    mut poll: P,
) -> Result<T, PollError<E>>
where
    S: FnOnce() -> SFut,
    SFut: Future<Output = Result<String, E>>,
    P: FnMut(String) -> PFut,
    PFut: Future<Output = Result<PollStatus<T>, E>>,
{
    let operation_id = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(PollError::Cancelled),
        submitted = submit() => submitted.map_err(PollError::Submit)?,
    };

    let submitted_at = Instant::now();
    let deadline = submitted_at + config.max_wait;
    tracing::debug!(
        operation_id = %operation_id,
        initial_delay_ms = config.initial_delay.as_millis() as u64,
        "Operation submitted, waiting before first poll",
    );

    if !sleep_until(cancel, (submitted_at + config.initial_delay).min(deadline)).await {
        return Err(PollError::Cancelled);
    }

    let mut interval = config.min_interval;
    let mut polls = 0u32;

    loop {
        if Instant::now() >= deadline {
            tracing::warn!(
                operation_id = %operation_id,
                polls,
                "Operation timed out",
            );
            return Err(PollError::TimedOut {
                operation_id,
                max_wait: config.max_wait,
                polls,
            });
        }

        polls += 1;
        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            status = poll(operation_id.clone()) => status,
        };

        match status {
            Ok(PollStatus::Completed(value)) => {
                tracing::debug!(
                    operation_id = %operation_id,
                    polls,
                    elapsed_ms = submitted_at.elapsed().as_millis() as u64,
                    "Operation completed",
                );
                return Ok(value);
            }
            Ok(PollStatus::Failed(reason)) => {
                return Err(PollError::Failed {
                    operation_id,
                    reason,
                });
            }
            Ok(PollStatus::Pending) => {}
            Err(source) => {
                return Err(PollError::Poll {
                    operation_id,
                    polls,
                    source,
                });
            }
        }

        tracing::trace!(
            operation_id = %operation_id,
            polls,
            next_poll_ms = interval.as_millis() as u64,
            "Operation still pending",
        );

        if !sleep_until(cancel, (Instant::now() + interval).min(deadline)).await {
            return Err(PollError::Cancelled);
        }
        interval = next_interval(interval, config);
    }
}
