pub mod backend;
pub mod container;
pub mod docker;
pub mod environment;
pub mod errors;
pub mod lifecycle;
pub mod project;

pub use backend::{Collaborators, ContainerInspector, LogAggregator, ProjectController};
pub use container::{ContainerState, ContainerStatus};
pub use docker::{
    DockerCompose, commands::ComposeCli, ensure_docker_available, ensure_docker_available_with,
};
pub use environment::ComposeEnvironment;
pub use errors::{ComposeRunnerError, InspectError};
pub use lifecycle::wait::{WaitOptions, wait_for_service_to_exit};
pub use project::{ComposeProject, ComposeProjectBuilder, ProjectPhase};
pub use testing_framework_core::{CommandError, ExecutionResult};
