use std::env;

use testing_framework_core::{
    CommandSpec, adjust_timeout,
    constants::{
        DEFAULT_COMPOSE_DOWN_TIMEOUT, DEFAULT_COMPOSE_QUERY_TIMEOUT, DEFAULT_COMPOSE_UP_TIMEOUT,
    },
};

use crate::project::ComposeProject;

/// Overrides the docker executable (e.g. `podman` or a wrapper script).
pub const DOCKER_BIN_ENV: &str = "COMPOSE_RUNNER_DOCKER";
const DEFAULT_DOCKER_BIN: &str = "docker";

/// Builds `docker compose` invocations for a project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposeCli {
    binary: String,
}

impl ComposeCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Docker binary from `COMPOSE_RUNNER_DOCKER`, else `docker`.
    pub fn from_env() -> Self {
        let binary = env::var(DOCKER_BIN_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DOCKER_BIN.to_owned());
        Self::new(binary)
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// `docker compose up --detach`.
    pub fn up(&self, project: &ComposeProject) -> CommandSpec {
        self.compose(project, ["up", "--detach"])
            .timeout(adjust_timeout(DEFAULT_COMPOSE_UP_TIMEOUT))
    }

    /// `docker compose kill`.
    pub fn kill(&self, project: &ComposeProject) -> CommandSpec {
        self.compose(project, ["kill"])
            .timeout(adjust_timeout(DEFAULT_COMPOSE_DOWN_TIMEOUT))
    }

    /// `docker compose down --volumes --remove-orphans`.
    pub fn down(&self, project: &ComposeProject) -> CommandSpec {
        self.compose(project, ["down", "--volumes", "--remove-orphans"])
            .timeout(adjust_timeout(DEFAULT_COMPOSE_DOWN_TIMEOUT))
    }

    /// `docker compose ps --all --format json`.
    pub fn ps(&self, project: &ComposeProject) -> CommandSpec {
        self.compose(project, ["ps", "--all", "--format", "json"])
            .timeout(adjust_timeout(DEFAULT_COMPOSE_QUERY_TIMEOUT))
    }

    /// `docker compose logs --no-color [service]`.
    pub fn logs(&self, project: &ComposeProject, service: Option<&str>) -> CommandSpec {
        self.compose(project, ["logs", "--no-color"])
            .args(service)
            .timeout(adjust_timeout(DEFAULT_COMPOSE_QUERY_TIMEOUT))
    }

    /// `docker compose run --rm -T -e K=V service cmd...`: a fresh one-off
    /// container.
    pub fn run(&self, project: &ComposeProject, service: &str, command: &[String]) -> CommandSpec {
        self.compose(project, ["run", "--rm", "-T"])
            .args(env_flags(project))
            .arg(service)
            .args(command.iter().cloned())
    }

    /// `docker compose exec -T -e K=V service cmd...`: inside the running
    /// container.
    pub fn exec(&self, project: &ComposeProject, service: &str, command: &[String]) -> CommandSpec {
        self.compose(project, ["exec", "-T"])
            .args(env_flags(project))
            .arg(service)
            .args(command.iter().cloned())
    }

    fn compose<const N: usize>(&self, project: &ComposeProject, args: [&str; N]) -> CommandSpec {
        CommandSpec::new(&self.binary)
            .arg("compose")
            .arg("-f")
            .arg(project.compose_file().to_string_lossy())
            .arg("-p")
            .arg(project.name())
            .args(args)
            .envs(project.env())
            .current_dir(project.root())
    }
}

impl Default for ComposeCli {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_flags(project: &ComposeProject) -> Vec<String> {
    project
        .env()
        .iter()
        .flat_map(|(key, value)| ["-e".to_owned(), format!("{key}={value}")])
        .collect()
}
