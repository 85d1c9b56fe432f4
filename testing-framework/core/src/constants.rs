use std::time::Duration;

/// Default budget for waiting on a service to exit.
pub const DEFAULT_EXIT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// First pause between two polls of a condition.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound for the pause between polls once backoff has grown.
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Timeout for `docker compose up`, which may pull images.
pub const DEFAULT_COMPOSE_UP_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for `docker compose down` and `docker compose kill`.
pub const DEFAULT_COMPOSE_DOWN_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for read-only compose queries (`ps`, `logs`).
pub const DEFAULT_COMPOSE_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the `docker info` availability check.
pub const DEFAULT_DOCKER_INFO_TIMEOUT: Duration = Duration::from_secs(15);
