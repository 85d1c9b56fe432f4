use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use testing_framework_core::{
    CommandError, CommandRunner, CommandSpec, ExecutionResult, logging::init_test_logging,
};
use testing_framework_runner_compose::{
    Collaborators, ComposeCli, ComposeEnvironment, ComposeProject, ComposeRunnerError,
    ProjectPhase, WaitOptions, ensure_docker_available_with,
};

/// Canned answer for one compose subcommand.
#[derive(Clone)]
enum Reply {
    Ok(&'static str),
    Fail {
        exit_code: i32,
        stdout: &'static str,
        stderr: &'static str,
    },
}

/// Records every command and answers by compose subcommand (`up`, `ps`, ...).
/// Queued replies are consumed in order; the last one repeats.
#[derive(Default)]
struct FakeRunner {
    replies: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeRunner {
    fn reply(&self, subcommand: &'static str, reply: Reply) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(subcommand)
            .or_default()
            .push_back(reply);
        self
    }

    fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    fn subcommands(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|spec| subcommand(spec).map(str::to_owned))
            .collect()
    }
}

fn subcommand(spec: &CommandSpec) -> Option<&str> {
    // docker compose -f <file> -p <name> <subcommand> ...
    spec.args.get(5).map(String::as_str)
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ExecutionResult, CommandError> {
        self.calls.lock().unwrap().push(spec.clone());

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            subcommand(spec)
                .and_then(|name| replies.get_mut(name))
                .and_then(|queue| {
                    if queue.len() > 1 {
                        queue.pop_front()
                    } else {
                        queue.front().cloned()
                    }
                })
                .unwrap_or(Reply::Ok(""))
        };

        match reply {
            Reply::Ok(stdout) => Ok(ExecutionResult {
                stdout: stdout.to_owned(),
                stderr: String::new(),
                exit_code: 0,
            }),
            Reply::Fail {
                exit_code,
                stdout,
                stderr,
            } => Err(CommandError::Failed {
                command: spec.to_string(),
                exit_code,
                stdout: stdout.to_owned(),
                stderr: stderr.to_owned(),
            }),
        }
    }
}

fn project() -> ComposeProject {
    ComposeProject::builder("/srv/suite/docker-compose.yml")
        .project_name("lifecycle-suite")
        .env("TEST_ENV_VAR", "hello world")
        .preserve(false)
        .build()
        .expect("valid project")
}

fn environment(runner: &Arc<FakeRunner>, project: ComposeProject) -> ComposeEnvironment {
    init_test_logging();
    let runner: Arc<dyn CommandRunner> = runner.clone();
    ComposeEnvironment::with_collaborators(
        project,
        Collaborators::with_runner(runner, ComposeCli::new("docker")),
    )
}

#[tokio::test]
async fn run_service_returns_trimmed_stdout() {
    let runner = Arc::new(FakeRunner::default());
    runner.reply("run", Reply::Ok("hello world"));
    let mut env = environment(&runner, project());

    env.setup().await.expect("setup");
    let result = env
        .run_service("app", ["echo", "hello world"])
        .await
        .expect("run succeeds");

    assert_eq!(result.stdout, "hello world");
    assert_eq!(result.exit_code, 0);
    assert_eq!(runner.subcommands(), ["up", "run"]);

    env.teardown().await.expect("teardown");
}

#[tokio::test]
async fn run_service_failure_carries_exit_code_and_streams() {
    let runner = Arc::new(FakeRunner::default());
    runner.reply(
        "run",
        Reply::Fail {
            exit_code: 3,
            stdout: "",
            stderr: "error message",
        },
    );
    let mut env = environment(&runner, project());
    env.setup().await.unwrap();

    let err = env
        .run_service("app", ["sh", "-c", "echo 'error message' >&2; exit 3"])
        .await
        .expect_err("exit 3 must fail");

    assert!(matches!(err, ComposeRunnerError::Command { .. }));
    assert_eq!(err.exit_code(), Some(3));
    assert_eq!(err.stderr(), Some("error message"));
    assert_eq!(err.stdout(), Some(""));
    assert_eq!(err.service(), Some("app"));

    env.teardown().await.unwrap();
}

#[tokio::test]
async fn env_overlay_is_forwarded_to_one_off_containers() {
    let runner = Arc::new(FakeRunner::default());
    let mut env = environment(&runner, project());
    env.setup().await.unwrap();

    env.run_service("app", ["printenv", "TEST_ENV_VAR"])
        .await
        .unwrap();

    let run = runner
        .calls()
        .into_iter()
        .find(|spec| subcommand(spec) == Some("run"))
        .expect("run recorded");
    assert_eq!(
        &run.args[5..],
        [
            "run",
            "--rm",
            "-T",
            "-e",
            "TEST_ENV_VAR=hello world",
            "app",
            "printenv",
            "TEST_ENV_VAR"
        ]
    );
    assert_eq!(run.env.get("TEST_ENV_VAR").map(String::as_str), Some("hello world"));
    assert_eq!(run.env.len(), 1);

    env.teardown().await.unwrap();
}

#[tokio::test]
async fn exec_results_are_not_cached() {
    let runner = Arc::new(FakeRunner::default());
    runner
        .reply("exec", Reply::Ok("first"))
        .reply("exec", Reply::Ok("second"));
    let mut env = environment(&runner, project());
    env.setup().await.unwrap();

    let first = env.exec_in_service("db", ["cat", "/state"]).await.unwrap();
    let second = env.exec_in_service("db", ["cat", "/state"]).await.unwrap();

    assert_eq!(first.stdout, "first");
    assert_eq!(second.stdout, "second");
    assert_eq!(runner.subcommands(), ["up", "exec", "exec"]);

    env.teardown().await.unwrap();
}

#[tokio::test]
async fn operations_before_setup_are_refused() {
    let runner = Arc::new(FakeRunner::default());
    let env = environment(&runner, project());

    let run = env.run_service("app", ["true"]).await.unwrap_err();
    let exec = env.exec_in_service("app", ["true"]).await.unwrap_err();
    let wait = env
        .wait_for_service_to_exit("app", WaitOptions::default())
        .await
        .unwrap_err();

    for err in [run, exec, wait] {
        assert!(
            matches!(
                err,
                ComposeRunnerError::InvalidPhase {
                    phase: ProjectPhase::Unset,
                    ..
                }
            ),
            "unexpected error: {err}"
        );
    }
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn startup_failure_is_reported_and_still_cleaned_up() {
    let runner = Arc::new(FakeRunner::default());
    runner.reply(
        "up",
        Reply::Fail {
            exit_code: 1,
            stdout: "",
            stderr: "pull access denied",
        },
    );
    let mut env = environment(&runner, project());

    let err = env.setup().await.expect_err("up fails");

    assert!(matches!(err, ComposeRunnerError::Startup { .. }));
    assert_eq!(err.exit_code(), Some(1));
    assert_eq!(err.stderr(), Some("pull access denied"));
    assert_eq!(env.phase(), ProjectPhase::Unset);

    env.teardown().await.expect("cleanup after failed start");
    assert_eq!(runner.subcommands(), ["up", "down"]);
}

#[tokio::test]
async fn teardown_is_idempotent_and_final() {
    let runner = Arc::new(FakeRunner::default());
    let mut env = environment(&runner, project());
    env.setup().await.unwrap();
    assert_eq!(env.phase(), ProjectPhase::Active);

    env.teardown().await.expect("first teardown");
    env.teardown().await.expect("second teardown");
    env.teardown().await.expect("third teardown");

    assert_eq!(env.phase(), ProjectPhase::Terminated);
    assert_eq!(runner.subcommands(), ["up", "down"]);

    let err = env.setup().await.expect_err("no resurrection");
    assert!(matches!(
        err,
        ComposeRunnerError::InvalidPhase {
            phase: ProjectPhase::Terminated,
            ..
        }
    ));
    assert!(env.run_service("app", ["true"]).await.is_err());
    assert_eq!(runner.subcommands(), ["up", "down"]);
}

#[tokio::test]
async fn teardown_failure_is_returned_once() {
    let runner = Arc::new(FakeRunner::default());
    runner.reply(
        "down",
        Reply::Fail {
            exit_code: 1,
            stdout: "",
            stderr: "daemon gone",
        },
    );
    let mut env = environment(&runner, project());
    env.setup().await.unwrap();

    let err = env.teardown().await.expect_err("down fails");
    assert!(matches!(err, ComposeRunnerError::Teardown { .. }));
    assert_eq!(env.phase(), ProjectPhase::Terminated);
    env.teardown().await.expect("later calls are no-ops");
}

#[tokio::test]
async fn force_kill_kills_before_removing() {
    let runner = Arc::new(FakeRunner::default());
    let project = ComposeProject::builder("/srv/suite/docker-compose.yml")
        .project_name("kill-suite")
        .force_kill(true)
        .preserve(false)
        .build()
        .unwrap();
    let mut env = environment(&runner, project);

    env.setup().await.unwrap();
    env.teardown().await.unwrap();

    assert_eq!(runner.subcommands(), ["up", "kill", "down"]);
}

#[tokio::test]
async fn dropping_an_active_environment_stops_the_project() {
    let runner = Arc::new(FakeRunner::default());
    {
        let mut env = environment(&runner, project());
        env.setup().await.unwrap();
    }

    assert_eq!(runner.subcommands(), ["up", "down"]);
}

#[tokio::test]
async fn wait_reports_exit_code_mismatch_with_logs() {
    let runner = Arc::new(FakeRunner::default());
    runner
        .reply(
            "ps",
            Reply::Ok(r#"{"Service":"job","State":"exited","ExitCode":3}"#),
        )
        .reply("logs", Reply::Ok("job-1  | something broke"));
    let mut env = environment(&runner, project());
    env.setup().await.unwrap();

    let err = env
        .wait_for_service_to_exit("job", WaitOptions::default())
        .await
        .expect_err("exit code 3 rejected");

    let message = err.to_string();
    assert_eq!(
        message.lines().next(),
        Some("Service exited with exit code 3:")
    );
    assert!(message.contains("something broke"));
    assert_eq!(runner.subcommands(), ["up", "ps", "logs"]);

    env.teardown().await.unwrap();
}

#[tokio::test]
async fn wait_polls_until_clean_exit() {
    let runner = Arc::new(FakeRunner::default());
    runner
        .reply(
            "ps",
            Reply::Ok(r#"{"Service":"job","State":"running","ExitCode":0}"#),
        )
        .reply(
            "ps",
            Reply::Ok(r#"[{"Service":"job","State":"exited","ExitCode":0}]"#),
        );
    let mut env = environment(&runner, project());
    env.setup().await.unwrap();

    env.wait_for_service_to_exit("job", WaitOptions::default())
        .await
        .expect("clean exit");

    assert_eq!(runner.subcommands(), ["up", "ps", "ps"]);
    env.teardown().await.unwrap();
}

#[tokio::test]
async fn wait_times_out_as_still_running() {
    let runner = Arc::new(FakeRunner::default());
    runner.reply(
        "ps",
        Reply::Ok(r#"{"Service":"job","State":"running","ExitCode":0}"#),
    );
    let mut env = environment(&runner, project());
    env.setup().await.unwrap();

    let err = env
        .wait_for_service_to_exit(
            "job",
            WaitOptions::default().with_timeout(Duration::from_millis(500)),
        )
        .await
        .expect_err("never exits");

    assert_eq!(err.to_string(), "Service is still running");
    env.teardown().await.unwrap();
}

#[tokio::test]
async fn inspection_errors_are_retried() {
    let runner = Arc::new(FakeRunner::default());
    runner
        .reply(
            "ps",
            Reply::Fail {
                exit_code: 1,
                stdout: "",
                stderr: "transient",
            },
        )
        .reply("ps", Reply::Ok("not json"))
        .reply(
            "ps",
            Reply::Ok(r#"{"Service":"job","State":"exited","ExitCode":0}"#),
        );
    let mut env = environment(&runner, project());
    env.setup().await.unwrap();

    env.wait_for_service_to_exit("job", WaitOptions::default())
        .await
        .expect("recovers after transient failures");

    assert_eq!(runner.subcommands(), ["up", "ps", "ps", "ps"]);
    env.teardown().await.unwrap();
}

#[tokio::test]
async fn commands_run_from_the_compose_file_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let compose_file = dir.path().join("docker-compose.yml");
    std::fs::write(&compose_file, "services:\n  app:\n    image: alpine:3.20\n")
        .expect("write compose file");

    let runner = Arc::new(FakeRunner::default());
    let project = ComposeProject::builder(&compose_file)
        .preserve(false)
        .build()
        .expect("project");
    let again = ComposeProject::new(&compose_file).expect("project");
    assert_eq!(project.name(), again.name());

    let mut env = environment(&runner, project);
    env.setup().await.unwrap();
    env.teardown().await.unwrap();

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    for spec in &calls {
        assert_eq!(spec.current_dir.as_deref(), Some(dir.path()));
        assert_eq!(spec.args[2], compose_file.to_string_lossy());
        assert_eq!(spec.args[4], env.project_name());
    }
}

fn preserved_project() -> ComposeProject {
    ComposeProject::builder("/srv/suite/docker-compose.yml")
        .project_name("preserved-suite")
        .preserve(true)
        .build()
        .expect("valid project")
}

#[tokio::test]
async fn preserved_project_survives_teardown() {
    let runner = Arc::new(FakeRunner::default());
    let mut env = environment(&runner, preserved_project());

    env.setup().await.unwrap();
    env.teardown().await.expect("preserve is not an error");

    assert_eq!(env.phase(), ProjectPhase::Terminated);
    assert_eq!(runner.subcommands(), ["up"]);
}

#[tokio::test]
async fn preserved_project_survives_drop() {
    let runner = Arc::new(FakeRunner::default());
    {
        let mut env = environment(&runner, preserved_project());
        env.setup().await.unwrap();
    }

    assert_eq!(runner.subcommands(), ["up"]);
}

#[tokio::test]
async fn dump_logs_returns_combined_project_logs() {
    let runner = Arc::new(FakeRunner::default());
    runner.reply("logs", Reply::Ok("app-1  | ready\njob-1  | done"));
    let mut env = environment(&runner, project());
    env.setup().await.unwrap();

    let logs = env.dump_logs().await.expect("logs collected");

    assert_eq!(logs, "app-1  | ready\njob-1  | done");
    let call = runner
        .calls()
        .into_iter()
        .find(|spec| subcommand(spec) == Some("logs"))
        .expect("logs recorded");
    assert_eq!(&call.args[5..], ["logs", "--no-color"]);

    env.teardown().await.unwrap();
}

#[tokio::test]
async fn dump_logs_failure_is_returned() {
    let runner = Arc::new(FakeRunner::default());
    runner.reply(
        "logs",
        Reply::Fail {
            exit_code: 1,
            stdout: "",
            stderr: "no such project",
        },
    );
    let env = environment(&runner, project());

    let err = env.dump_logs().await.expect_err("logs fail");
    assert_eq!(err.stderr(), Some("no such project"));
}

/// Answers every command with the same failure.
struct BrokenDocker;

#[async_trait]
impl CommandRunner for BrokenDocker {
    async fn run(&self, spec: &CommandSpec) -> Result<ExecutionResult, CommandError> {
        Err(CommandError::Failed {
            command: spec.to_string(),
            exit_code: 1,
            stdout: String::new(),
            stderr: "Cannot connect to the Docker daemon".into(),
        })
    }
}

#[tokio::test]
async fn docker_availability_follows_docker_info() {
    let cli = ComposeCli::new("docker");
    let runner = FakeRunner::default();

    ensure_docker_available_with(&runner, &cli)
        .await
        .expect("docker info succeeds");
    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program, "docker");
    assert_eq!(calls[0].args, ["info"]);

    let err = ensure_docker_available_with(&BrokenDocker, &cli)
        .await
        .expect_err("docker info fails");
    assert!(matches!(err, ComposeRunnerError::DockerUnavailable));
}

#[tokio::test]
async fn wait_reports_inspection_that_never_works() {
    let runner = Arc::new(FakeRunner::default());
    runner.reply(
        "ps",
        Reply::Fail {
            exit_code: 1,
            stdout: "",
            stderr: "daemon unreachable",
        },
    );
    let mut env = environment(&runner, project());
    env.setup().await.unwrap();

    let err = env
        .wait_for_service_to_exit(
            "job",
            WaitOptions::default().with_timeout(Duration::from_millis(300)),
        )
        .await
        .expect_err("ps keeps failing");

    assert!(matches!(err, ComposeRunnerError::Inspect { .. }), "{err}");
    assert_eq!(err.stderr(), Some("daemon unreachable"));
    env.teardown().await.unwrap();
}
