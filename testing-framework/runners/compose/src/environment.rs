use std::{path::PathBuf, sync::Arc};

use testing_framework_core::{CommandError, CommandSpec, ExecutionResult};
use tracing::{debug, error, info, warn};

use crate::{
    backend::Collaborators,
    docker::DockerCompose,
    errors::ComposeRunnerError,
    lifecycle::{
        cleanup::stop_project_blocking,
        wait::{WaitOptions, wait_for_service_to_exit},
    },
    project::{ComposeProject, ProjectPhase},
};

/// Owns one compose project for the duration of a test.
///
/// `setup` must complete before `run_service`, `exec_in_service` or
/// `wait_for_service_to_exit` are used, and those are refused once
/// `teardown` has run. If the environment is dropped after setup without a
/// teardown (e.g. a panicking test), the project is stopped from `Drop`.
pub struct ComposeEnvironment {
    project: ComposeProject,
    collaborators: Collaborators,
    phase: ProjectPhase,
    cleanup_pending: bool,
}

impl ComposeEnvironment {
    /// Environment driving the real docker compose CLI.
    pub fn new(project: ComposeProject) -> Self {
        Self::with_collaborators(project, Collaborators::docker())
    }

    /// Shorthand for a project with default options.
    pub fn from_compose_file(path: impl Into<PathBuf>) -> Result<Self, ComposeRunnerError> {
        ComposeProject::new(path).map(Self::new)
    }

    pub fn with_collaborators(project: ComposeProject, collaborators: Collaborators) -> Self {
        Self {
            project,
            collaborators,
            phase: ProjectPhase::Unset,
            cleanup_pending: false,
        }
    }

    /// Docker compose project name, for correlating diagnostics.
    pub fn project_name(&self) -> &str {
        self.project.name()
    }

    pub const fn project(&self) -> &ComposeProject {
        &self.project
    }

    pub const fn phase(&self) -> ProjectPhase {
        self.phase
    }

    /// Start every service of the project.
    pub async fn setup(&mut self) -> Result<(), ComposeRunnerError> {
        self.ensure_phase(ProjectPhase::Unset, "set up")?;
        self.cleanup_pending = true;

        info!(
            project = self.project_name(),
            compose_file = %self.project.compose_file().display(),
            force_kill = self.project.force_kill(),
            "compose project starting"
        );

        self.collaborators
            .controller
            .start(&self.project)
            .await
            .map_err(|source| {
                error!(project = self.project_name(), error = %source, "compose project failed to start");
                ComposeRunnerError::Startup {
                    project: self.project_name().to_owned(),
                    source,
                }
            })?;

        self.phase = ProjectPhase::Active;
        info!(project = self.project_name(), "compose project active");
        Ok(())
    }

    /// Stop and remove the project. Later calls are no-ops.
    ///
    /// The project counts as torn down even if stopping fails; the error is
    /// logged and returned so the caller can decide whether it matters.
    pub async fn teardown(&mut self) -> Result<(), ComposeRunnerError> {
        if self.phase == ProjectPhase::Terminated {
            debug!(project = self.project_name(), "compose project already torn down");
            return Ok(());
        }

        let pending = std::mem::replace(&mut self.cleanup_pending, false);
        self.phase = ProjectPhase::Terminated;

        if !pending {
            return Ok(());
        }
        if self.project.preserve() {
            warn!(
                project = self.project_name(),
                "compose preserve flag set; skipping docker compose down"
            );
            return Ok(());
        }

        info!(project = self.project_name(), "compose project tearing down");
        self.collaborators
            .controller
            .stop(&self.project, self.project.force_kill())
            .await
            .map_err(|source| {
                warn!(project = self.project_name(), error = %source, "compose teardown failed");
                ComposeRunnerError::Teardown {
                    project: self.project_name().to_owned(),
                    source,
                }
            })
    }

    /// Run `command` in a fresh one-off container of `service`.
    pub async fn run_service<I, S>(
        &self,
        service: &str,
        command: I,
    ) -> Result<ExecutionResult, ComposeRunnerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_phase(ProjectPhase::Active, "run a service")?;
        let command = collect_command(command);
        let spec = self.collaborators.cli.run(&self.project, service, &command);
        self.execute(service, spec).await
    }

    /// Run `command` inside the already running container of `service`.
    pub async fn exec_in_service<I, S>(
        &self,
        service: &str,
        command: I,
    ) -> Result<ExecutionResult, ComposeRunnerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_phase(ProjectPhase::Active, "exec in a service")?;
        let command = collect_command(command);
        let spec = self.collaborators.cli.exec(&self.project, service, &command);
        self.execute(service, spec).await
    }

    /// Wait until `service` exits; see [`wait_for_service_to_exit`].
    pub async fn wait_for_service_to_exit(
        &self,
        service: &str,
        options: WaitOptions,
    ) -> Result<(), ComposeRunnerError> {
        self.ensure_phase(ProjectPhase::Active, "wait for a service")?;
        info!(
            project = self.project_name(),
            service,
            timeout_secs = options.timeout.as_secs(),
            accept_any_exit_code = options.accept_any_exit_code,
            "waiting for service to exit"
        );

        wait_for_service_to_exit(
            self.collaborators.inspector.as_ref(),
            self.collaborators.logs.as_ref(),
            &self.project,
            service,
            options,
        )
        .await
    }

    /// Log the combined output of every service at error level and hand it
    /// back, e.g. to attach to a test failure.
    pub async fn dump_logs(&self) -> Result<String, CommandError> {
        let compose = DockerCompose::new(
            Arc::clone(&self.collaborators.runner),
            self.collaborators.cli.clone(),
        );
        match compose.project_logs(&self.project).await {
            Ok(logs) => {
                error!(project = self.project_name(), "docker compose logs:\n{logs}");
                Ok(logs)
            }
            Err(err) => {
                warn!(project = self.project_name(), error = %err, "failed to collect docker compose logs");
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        service: &str,
        spec: CommandSpec,
    ) -> Result<ExecutionResult, ComposeRunnerError> {
        debug!(project = self.project_name(), service, command = %spec, "compose command");
        self.collaborators
            .runner
            .run(&spec)
            .await
            .map_err(|source| {
                debug!(
                    project = self.project_name(),
                    service,
                    exit_code = ?source.exit_code(),
                    "compose command failed"
                );
                ComposeRunnerError::Command {
                    service: service.to_owned(),
                    source,
                }
            })
    }

    fn ensure_phase(
        &self,
        expected: ProjectPhase,
        operation: &'static str,
    ) -> Result<(), ComposeRunnerError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(ComposeRunnerError::InvalidPhase {
                operation,
                phase: self.phase,
            })
        }
    }
}

impl Drop for ComposeEnvironment {
    fn drop(&mut self) {
        if !self.cleanup_pending || self.phase == ProjectPhase::Terminated {
            return;
        }

        if self.project.preserve() {
            warn!(
                project = self.project_name(),
                "compose preserve flag set; leaving project running"
            );
            return;
        }

        warn!(project = self.project_name(), "compose environment dropped without teardown; stopping project");
        if let Err(err) = stop_project_blocking(
            Arc::clone(&self.collaborators.controller),
            self.project.clone(),
        ) {
            error!(project = self.project_name(), error = %err, "compose cleanup on drop failed");
        }
    }
}

fn collect_command<I, S>(command: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    command.into_iter().map(Into::into).collect()
}
