use std::{path::PathBuf, time::Duration};

use testing_framework_core::CommandError;

use crate::project::ProjectPhase;

#[derive(Debug, thiserror::Error)]
/// Top-level compose runner errors.
pub enum ComposeRunnerError {
    #[error("docker does not appear to be available on this host")]
    DockerUnavailable,
    #[error("invalid compose project for {}: {reason}", path.display())]
    Project { path: PathBuf, reason: String },
    #[error("compose project {project} failed to start: {source}")]
    Startup {
        project: String,
        #[source]
        source: CommandError,
    },
    #[error("command in service {service} failed: {source}")]
    Command {
        service: String,
        #[source]
        source: CommandError,
    },
    #[error("Service exited with exit code {exit_code}:\n{logs}")]
    ExitCodeMismatch {
        service: String,
        exit_code: i32,
        logs: String,
    },
    #[error("Service is still running")]
    StillRunning { service: String, timeout: Duration },
    #[error("failed to inspect containers of project {project}: {source}")]
    Inspect {
        project: String,
        #[source]
        source: InspectError,
    },
    #[error("compose project {project} failed to stop: {source}")]
    Teardown {
        project: String,
        #[source]
        source: CommandError,
    },
    #[error("cannot {operation} while the project is {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: ProjectPhase,
    },
}

impl ComposeRunnerError {
    /// Exit code of the failed process, when the failure came from one.
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Startup { source, .. }
            | Self::Command { source, .. }
            | Self::Teardown { source, .. }
            | Self::Inspect {
                source: InspectError::Command(source),
                ..
            } => source.exit_code(),
            Self::ExitCodeMismatch { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    pub fn stdout(&self) -> Option<&str> {
        self.command_error().and_then(CommandError::stdout)
    }

    pub fn stderr(&self) -> Option<&str> {
        self.command_error().and_then(CommandError::stderr)
    }

    /// Service the failure concerns, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::Command { service, .. }
            | Self::ExitCodeMismatch { service, .. }
            | Self::StillRunning { service, .. } => Some(service),
            _ => None,
        }
    }

    const fn command_error(&self) -> Option<&CommandError> {
        match self {
            Self::Startup { source, .. }
            | Self::Command { source, .. }
            | Self::Teardown { source, .. }
            | Self::Inspect {
                source: InspectError::Command(source),
                ..
            } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
/// Failures reading container state from the orchestrator.
pub enum InspectError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("unreadable container listing: {0}")]
    Parse(#[from] serde_json::Error),
}
