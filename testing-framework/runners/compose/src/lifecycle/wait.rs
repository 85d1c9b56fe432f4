use std::{
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use testing_framework_core::{
    Attempt, RetryError, RetryPolicy, constants::DEFAULT_EXIT_WAIT_TIMEOUT, poll,
};
use tracing::{debug, warn};

use crate::{
    backend::{ContainerInspector, LogAggregator},
    errors::{ComposeRunnerError, InspectError},
    project::ComposeProject,
};

/// How [`wait_for_service_to_exit`] judges the outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitOptions {
    /// Treat any exit code as success, not only zero.
    pub accept_any_exit_code: bool,
    /// Total time to wait for the exited state.
    pub timeout: Duration,
}

impl WaitOptions {
    #[must_use]
    pub const fn accept_any_exit_code(mut self) -> Self {
        self.accept_any_exit_code = true;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            accept_any_exit_code: false,
            timeout: DEFAULT_EXIT_WAIT_TIMEOUT,
        }
    }
}

/// Poll the project's containers until `service` has exited.
///
/// A clean exit (or any exit with `accept_any_exit_code`) succeeds. A rejected
/// exit code fails at once with the service logs attached, since a later poll
/// cannot change it. A missing or not-yet-exited container is polled again
/// until `options.timeout`, after which the wait fails as still running. If no
/// inspection succeeded during the whole wait, the last inspection error is
/// returned instead.
pub async fn wait_for_service_to_exit(
    inspector: &dyn ContainerInspector,
    logs: &dyn LogAggregator,
    project: &ComposeProject,
    service: &str,
    options: WaitOptions,
) -> Result<(), ComposeRunnerError> {
    let policy = RetryPolicy::new(options.timeout);
    let history = InspectionHistory::default();

    let outcome = poll(&policy, || {
        check_exit(
            inspector,
            logs,
            project,
            service,
            options.accept_any_exit_code,
            &history,
        )
    })
    .await;

    match outcome {
        Ok(exit_code) => {
            debug!(project = project.name(), service, exit_code, "service exited");
            Ok(())
        }
        Err(RetryError::Aborted(err)) => Err(err),
        Err(RetryError::Timeout {
            elapsed,
            attempts,
            last_reason,
        }) => {
            warn!(
                project = project.name(),
                service,
                attempts,
                ?elapsed,
                last_observation = %last_reason,
                "service did not exit in time"
            );
            if let Some(source) = history.never_succeeded() {
                return Err(ComposeRunnerError::Inspect {
                    project: project.name().to_owned(),
                    source,
                });
            }
            Err(ComposeRunnerError::StillRunning {
                service: service.to_owned(),
                timeout: options.timeout,
            })
        }
    }
}

async fn check_exit(
    inspector: &dyn ContainerInspector,
    logs: &dyn LogAggregator,
    project: &ComposeProject,
    service: &str,
    accept_any_exit_code: bool,
    history: &InspectionHistory,
) -> Attempt<i32, ComposeRunnerError> {
    let containers = match inspector.list(project).await {
        Ok(containers) => {
            history.succeeded.store(true, Ordering::Relaxed);
            containers
        }
        Err(err) => {
            debug!(project = project.name(), service, error = %err, "container inspection failed");
            let reason = format!("inspection failed: {err}");
            history.record_failure(err);
            return Attempt::Retry(reason);
        }
    };

    let Some(container) = containers.iter().find(|c| c.service == service) else {
        return Attempt::Retry(format!("no container for service {service}"));
    };

    match container.exit_code() {
        None => Attempt::Retry(format!("service {service} is {:?}", container.state)),
        Some(code) if accept_any_exit_code || code == 0 => Attempt::Done(code),
        Some(code) => {
            let logs = collect_logs(logs, project, service).await;
            Attempt::Abort(ComposeRunnerError::ExitCodeMismatch {
                service: service.to_owned(),
                exit_code: code,
                logs,
            })
        }
    }
}

/// Inspection outcomes seen during one wait.
#[derive(Default)]
struct InspectionHistory {
    succeeded: AtomicBool,
    last_error: Mutex<Option<InspectError>>,
}

impl InspectionHistory {
    fn record_failure(&self, err: InspectError) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    /// Last inspection error, if the inspector never answered successfully.
    fn never_succeeded(self) -> Option<InspectError> {
        if self.succeeded.into_inner() {
            return None;
        }
        self.last_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn collect_logs(logs: &dyn LogAggregator, project: &ComposeProject, service: &str) -> String {
    match logs.logs_for(project, service).await {
        Ok(text) => text,
        Err(err) => {
            warn!(project = project.name(), service, error = %err, "failed to collect service logs");
            format!("<failed to collect logs for {service}: {err}>")
        }
    }
}
