use std::str::FromStr;

/// Lifecycle state of a container as reported by the orchestrator.
///
/// Anything this model does not know about lands in `Other` and counts as
/// "not exited".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Exited,
    Other(String),
}

impl ContainerState {
    pub const fn is_exited(&self) -> bool {
        matches!(self, Self::Exited)
    }
}

impl FromStr for ContainerState {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let state = match raw.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "exited" => Self::Exited,
            other => Self::Other(other.to_owned()),
        };
        Ok(state)
    }
}

/// Snapshot of one container in a project. Produced fresh per inspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerStatus {
    pub service: String,
    pub state: ContainerState,
    exit_code: Option<i32>,
}

impl ContainerStatus {
    /// The exit code is kept only for exited containers.
    pub fn new(service: impl Into<String>, state: ContainerState, exit_code: i32) -> Self {
        let exit_code = state.is_exited().then_some(exit_code);
        Self {
            service: service.into(),
            state,
            exit_code,
        }
    }

    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
}
