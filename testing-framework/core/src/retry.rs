use std::{fmt::Display, future::Future, time::Duration};

use thiserror::Error;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, trace};

use crate::constants::{DEFAULT_EXIT_WAIT_TIMEOUT, DEFAULT_MAX_POLL_INTERVAL, DEFAULT_POLL_INTERVAL};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// What a single condition check reports back to [`poll`].
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// Condition holds; stop and hand `T` to the caller.
    Done(T),
    /// Condition does not hold yet; poll again unless the deadline passed.
    Retry(String),
    /// Condition can never hold; stop now regardless of remaining budget.
    Abort(E),
}

/// Budget and pacing for [`poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retry_time: Duration,
    initial_interval: Duration,
    max_interval: Duration,
}

impl RetryPolicy {
    /// Policy with the given total budget and the default backoff.
    pub fn new(max_retry_time: Duration) -> Self {
        Self {
            max_retry_time,
            ..Self::default()
        }
    }

    #[must_use]
    /// Override the backoff bounds. Both are clamped to at least one
    /// millisecond and `max` is raised to `initial` if smaller.
    pub fn with_intervals(mut self, initial: Duration, max: Duration) -> Self {
        let initial = initial.max(MIN_POLL_INTERVAL);
        self.initial_interval = initial;
        self.max_interval = max.max(initial);
        self
    }

    pub const fn max_retry_time(&self) -> Duration {
        self.max_retry_time
    }

    /// Pause before the attempt following attempt number `attempt` (1-based):
    /// doubles from the initial interval, capped at the max interval.
    pub fn interval_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_interval
            .saturating_mul(1u32 << shift)
            .min(self.max_interval)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_time: DEFAULT_EXIT_WAIT_TIMEOUT,
            initial_interval: DEFAULT_POLL_INTERVAL,
            max_interval: DEFAULT_MAX_POLL_INTERVAL,
        }
    }
}

/// Why [`poll`] gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("condition not met after {attempts} attempts in {elapsed:?}: {last_reason}")]
    Timeout {
        elapsed: Duration,
        attempts: u32,
        last_reason: String,
    },
    #[error("condition aborted: {0}")]
    Aborted(E),
}

impl<E> RetryError<E> {
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Run `check` until it reports [`Attempt::Done`] or [`Attempt::Abort`], or
/// until `policy.max_retry_time` has elapsed since the first attempt.
///
/// A check is always invoked at least once, and an abort reported before the
/// deadline always wins over a timeout. Each check only gets the budget left:
/// one still pending at the deadline is dropped and the poll times out. Sleeps
/// never run past the deadline.
pub async fn poll<T, E, F, Fut>(policy: &RetryPolicy, mut check: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
    E: Display,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;
    let mut last_reason: Option<String> = None;

    loop {
        attempts = attempts.saturating_add(1);

        let remaining = policy.max_retry_time.saturating_sub(started.elapsed());
        let Ok(attempt) = timeout(remaining, check()).await else {
            let elapsed = started.elapsed();
            let last_reason = last_reason.map_or_else(
                || "check still pending at deadline".to_owned(),
                |reason| format!("{reason} (next check still pending at deadline)"),
            );
            debug!(attempts, ?elapsed, reason = %last_reason, "check cut off by deadline");
            return Err(RetryError::Timeout {
                elapsed,
                attempts,
                last_reason,
            });
        };

        let reason = match attempt {
            Attempt::Done(value) => {
                debug!(attempts, elapsed = ?started.elapsed(), "condition satisfied");
                return Ok(value);
            }
            Attempt::Abort(err) => {
                debug!(attempts, error = %err, "condition aborted");
                return Err(RetryError::Aborted(err));
            }
            Attempt::Retry(reason) => reason,
        };

        let elapsed = started.elapsed();
        if elapsed >= policy.max_retry_time {
            debug!(attempts, ?elapsed, reason = %reason, "retry budget exhausted");
            return Err(RetryError::Timeout {
                elapsed,
                attempts,
                last_reason: reason,
            });
        }

        let remaining = policy.max_retry_time - elapsed;
        let pause = policy.interval_after(attempts).min(remaining);
        trace!(attempts, ?pause, reason = %reason, "condition not met yet");
        last_reason = Some(reason);
        sleep(pause.max(MIN_POLL_INTERVAL)).await;
    }
}
