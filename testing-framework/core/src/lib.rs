pub mod constants;
pub mod logging;
pub mod process;
pub mod retry;

use std::{env, time::Duration};

pub use process::{CommandError, CommandRunner, CommandSpec, ExecutionResult, TokioCommandRunner};
pub use retry::{Attempt, RetryError, RetryPolicy, poll};

/// Environment flag that stretches internal command timeouts on slow hosts.
pub const SLOW_TEST_ENV: &str = "SLOW_TEST_ENV";

const SLOW_TIMEOUT_FACTOR: u32 = 2;

/// Scale a timeout when `SLOW_TEST_ENV=true` is set, otherwise return it as is.
pub fn adjust_timeout(duration: Duration) -> Duration {
    let slow = env::var(SLOW_TEST_ENV)
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if slow {
        duration.saturating_mul(SLOW_TIMEOUT_FACTOR)
    } else {
        duration
    }
}
