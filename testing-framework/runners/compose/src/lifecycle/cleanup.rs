use std::{env, io, sync::Arc, thread};

use testing_framework_core::CommandError;

use crate::{backend::ProjectController, errors::ComposeRunnerError, project::ComposeProject};

/// Leave the stack running after the test for manual inspection.
pub const PRESERVE_ENV: &str = "COMPOSE_RUNNER_PRESERVE";

/// Whether teardown should be skipped for debugging.
pub fn should_preserve() -> bool {
    env::var_os(PRESERVE_ENV).is_some()
}

/// Stop a project from synchronous code (e.g. `Drop`), even when called from
/// inside a tokio runtime: the stop runs on a helper thread with its own
/// current-thread runtime.
pub fn stop_project_blocking(
    controller: Arc<dyn ProjectController>,
    project: ComposeProject,
) -> Result<(), ComposeRunnerError> {
    let project_name = project.name().to_owned();

    let handle = thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| CommandError::Spawn {
                command: "docker compose down".into(),
                source,
            })?;
        runtime.block_on(controller.stop(&project, project.force_kill()))
    });

    let outcome = handle.join().unwrap_or_else(|_| {
        Err(CommandError::Spawn {
            command: "docker compose down".into(),
            source: io::Error::other("join failure running compose down"),
        })
    });

    outcome.map_err(|source| ComposeRunnerError::Teardown {
        project: project_name,
        source,
    })
}
