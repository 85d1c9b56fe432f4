use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_TEST_FILTER: &str = "info";

/// Install a fmt subscriber that writes through the test harness.
///
/// Honors `RUST_LOG`, falling back to `info`. Safe to call from every test:
/// only the first call installs the subscriber.
pub fn init_test_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER));

    let _ = fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
