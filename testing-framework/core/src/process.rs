use std::{
    collections::BTreeMap,
    env,
    ffi::OsString,
    fmt, io,
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{process::Command, time::timeout};
use tracing::debug;

/// Exit code reported when a process ends without one (killed by a signal).
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// A process to spawn: executable, arguments and the environment overlay.
///
/// The overlay is applied on top of a cleared environment; only the ambient
/// `PATH` is carried over so runs stay reproducible.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub current_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Human readable command line used in errors and logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Outcome of a command that exited with status zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecutionResult {
    /// Build from raw process output, trimming trailing newlines.
    pub fn from_output(stdout: &[u8], stderr: &[u8], exit_code: i32) -> Self {
        Self {
            stdout: trim_trailing_newlines(stdout),
            stderr: trim_trailing_newlines(stderr),
            exit_code,
        }
    }
}

/// Errors spawning or running an external command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{command} exited with code {exit_code}: {stderr}")]
    Failed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

impl CommandError {
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    pub fn stdout(&self) -> Option<&str> {
        match self {
            Self::Failed { stdout, .. } => Some(stdout),
            _ => None,
        }
    }

    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Spawns a process and captures its output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. A non-zero exit is reported as
    /// [`CommandError::Failed`] carrying both streams.
    async fn run(&self, spec: &CommandSpec) -> Result<ExecutionResult, CommandError>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ExecutionResult, CommandError> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args).env_clear();
        // Ambient PATH first so an overlay PATH wins.
        if let Some(path) = ambient_path() {
            command.env("PATH", path);
        }
        command
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        let description = spec.display();
        debug!(command = %description, "running command");

        let output = match spec.timeout {
            Some(limit) => timeout(limit, command.output())
                .await
                .map_err(|_| CommandError::Timeout {
                    command: description.clone(),
                    timeout: limit,
                })?,
            None => command.output().await,
        }
        .map_err(|source| CommandError::Spawn {
            command: description.clone(),
            source,
        })?;

        let result = ExecutionResult::from_output(
            &output.stdout,
            &output.stderr,
            exit_code(output.status),
        );

        if output.status.success() {
            Ok(result)
        } else {
            debug!(command = %description, exit_code = result.exit_code, "command failed");
            Err(CommandError::Failed {
                command: description,
                exit_code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            })
        }
    }
}

fn ambient_path() -> Option<OsString> {
    env::var_os("PATH")
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(UNKNOWN_EXIT_CODE)
}

fn trim_trailing_newlines(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\n', '\r'])
        .to_owned()
}
