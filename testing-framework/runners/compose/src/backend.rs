use std::sync::Arc;

use async_trait::async_trait;
use testing_framework_core::{CommandError, CommandRunner, TokioCommandRunner};

use crate::{
    container::ContainerStatus,
    docker::{DockerCompose, commands::ComposeCli},
    errors::InspectError,
    project::ComposeProject,
};

/// Starts and stops a whole compose project.
#[async_trait]
pub trait ProjectController: Send + Sync {
    /// Pull, create and start every declared service.
    async fn start(&self, project: &ComposeProject) -> Result<(), CommandError>;

    /// Stop and remove the project's containers, killing them first when
    /// `force_kill` is set.
    async fn stop(&self, project: &ComposeProject, force_kill: bool) -> Result<(), CommandError>;
}

/// Lists the containers of a project with their current state.
#[async_trait]
pub trait ContainerInspector: Send + Sync {
    async fn list(&self, project: &ComposeProject) -> Result<Vec<ContainerStatus>, InspectError>;
}

/// Reads the combined stdout/stderr history of one service.
#[async_trait]
pub trait LogAggregator: Send + Sync {
    async fn logs_for(&self, project: &ComposeProject, service: &str)
    -> Result<String, CommandError>;
}

/// Everything a [`crate::ComposeEnvironment`] talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub controller: Arc<dyn ProjectController>,
    pub inspector: Arc<dyn ContainerInspector>,
    pub logs: Arc<dyn LogAggregator>,
    pub runner: Arc<dyn CommandRunner>,
    pub cli: ComposeCli,
}

impl Collaborators {
    /// Docker compose CLI driven through real processes.
    pub fn docker() -> Self {
        Self::with_runner(Arc::new(TokioCommandRunner), ComposeCli::from_env())
    }

    /// Docker compose CLI driven through the given runner.
    pub fn with_runner(runner: Arc<dyn CommandRunner>, cli: ComposeCli) -> Self {
        let compose = Arc::new(DockerCompose::new(Arc::clone(&runner), cli.clone()));
        Self {
            controller: compose.clone(),
            inspector: compose.clone(),
            logs: compose,
            runner,
            cli,
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::docker()
    }
}
