pub mod commands;
pub mod inspect;

use std::sync::Arc;

use async_trait::async_trait;
use testing_framework_core::{
    CommandError, CommandRunner, CommandSpec, TokioCommandRunner, adjust_timeout,
    constants::DEFAULT_DOCKER_INFO_TIMEOUT,
};
use tracing::{debug, info, warn};

use crate::{
    backend::{ContainerInspector, LogAggregator, ProjectController},
    container::ContainerStatus,
    docker::{commands::ComposeCli, inspect::parse_ps_output},
    errors::{ComposeRunnerError, InspectError},
    project::ComposeProject,
};

/// Checks that `docker info` succeeds within a timeout.
pub async fn ensure_docker_available() -> Result<(), ComposeRunnerError> {
    ensure_docker_available_with(&TokioCommandRunner, &ComposeCli::from_env()).await
}

/// Same as [`ensure_docker_available`] through an explicit runner and binary.
pub async fn ensure_docker_available_with(
    runner: &dyn CommandRunner,
    cli: &ComposeCli,
) -> Result<(), ComposeRunnerError> {
    let docker_info = CommandSpec::new(cli.binary())
        .arg("info")
        .timeout(adjust_timeout(DEFAULT_DOCKER_INFO_TIMEOUT));

    match runner.run(&docker_info).await {
        Ok(_) => Ok(()),
        Err(err) => {
            debug!(error = %err, "docker info failed");
            Err(ComposeRunnerError::DockerUnavailable)
        }
    }
}

/// Docker compose CLI implementation of the project collaborators.
pub struct DockerCompose {
    runner: Arc<dyn CommandRunner>,
    cli: ComposeCli,
}

impl DockerCompose {
    pub fn new(runner: Arc<dyn CommandRunner>, cli: ComposeCli) -> Self {
        Self { runner, cli }
    }

    /// Combined logs of every service, for post-mortem dumps.
    pub async fn project_logs(&self, project: &ComposeProject) -> Result<String, CommandError> {
        let output = self.runner.run(&self.cli.logs(project, None)).await?;
        Ok(combine_streams(&output.stdout, &output.stderr))
    }
}

#[async_trait]
impl ProjectController for DockerCompose {
    async fn start(&self, project: &ComposeProject) -> Result<(), CommandError> {
        info!(project = project.name(), compose_file = %project.compose_file().display(), "docker compose up");
        self.runner.run(&self.cli.up(project)).await.map(|_| ())
    }

    async fn stop(&self, project: &ComposeProject, force_kill: bool) -> Result<(), CommandError> {
        if force_kill {
            info!(project = project.name(), "docker compose kill");
            if let Err(err) = self.runner.run(&self.cli.kill(project)).await {
                // Nothing left to kill is fine; `down` below still cleans up.
                warn!(project = project.name(), error = %err, "docker compose kill failed");
            }
        }

        info!(project = project.name(), "docker compose down");
        self.runner.run(&self.cli.down(project)).await.map(|_| ())
    }
}

#[async_trait]
impl ContainerInspector for DockerCompose {
    async fn list(&self, project: &ComposeProject) -> Result<Vec<ContainerStatus>, InspectError> {
        let output = self.runner.run(&self.cli.ps(project)).await?;
        Ok(parse_ps_output(&output.stdout)?)
    }
}

#[async_trait]
impl LogAggregator for DockerCompose {
    async fn logs_for(
        &self,
        project: &ComposeProject,
        service: &str,
    ) -> Result<String, CommandError> {
        let output = self.runner.run(&self.cli.logs(project, Some(service))).await?;
        Ok(combine_streams(&output.stdout, &output.stderr))
    }
}

fn combine_streams(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout.to_owned(),
        (true, false) => stderr.to_owned(),
        (false, false) => format!("{stdout}\n{stderr}"),
    }
}
