//! Drives [`DockerCli`] against a shell script standing in for `docker`.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bramble_plugins::runtime::{ContainerId, ContainerRuntime, ContainerSpec, RuntimeError};
use bramble_plugins::testing::capture_streams;
use bramble_plugins::{
    ContainerInvoker, DockerCli, InvocationContext, Invoker, InvokerSpec, Manifest, PluginError,
};
use tokio_util::sync::CancellationToken;

struct FakeDocker {
    create: &'static str,
    logs: &'static str,
    exit_code: i32,
}

impl Default for FakeDocker {
    fn default() -> Self {
        Self {
            create: "echo fake-id",
            logs: "echo out; echo err >&2",
            exit_code: 0,
        }
    }
}

impl FakeDocker {
    /// Write the script and return `(binary, call log)`.
    fn install(&self, dir: &Path) -> (PathBuf, PathBuf) {
        let log = dir.join("docker-calls.log");
        let script = format!(
            r#"#!/bin/sh
echo "$@" >> "{log}"
case "$1" in
  create) {create} ;;
  start|kill|rm) echo "$2" ;;
  logs) {logs} ;;
  wait) echo {exit_code} ;;
  *) echo "unknown command $1" >&2; exit 1 ;;
esac
"#,
            log = log.display(),
            create = self.create,
            logs = self.logs,
            exit_code = self.exit_code,
        );
        let bin = dir.join("fake-docker");
        std::fs::write(&bin, script).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        (bin, log)
    }
}

fn manifest(tty: bool) -> Manifest {
    Manifest::new(
        vec!["db".to_owned()],
        InvokerSpec::Container {
            image: "alpine".to_owned(),
            tty,
        },
    )
    .unwrap()
}

async fn run(bin: &Path, tty: bool) -> (Result<(), PluginError>, String, String) {
    let (streams, stdout, stderr) = capture_streams();
    let invoker = ContainerInvoker::new(Arc::new(DockerCli::new(bin.display().to_string())), streams);
    let ctx = InvocationContext::new(vec!["--flag".to_owned(), "value".to_owned()]).with_env("A", "C");
    let result = invoker
        .invoke(&manifest(tty), &ctx, &CancellationToken::new())
        .await;
    (result, stdout.contents(), stderr.contents())
}

#[tokio::test]
async fn container_output_is_split_by_stream() {
    let tmp = tempfile::tempdir().unwrap();
    let (bin, log) = FakeDocker::default().install(tmp.path());

    let (result, stdout, stderr) = run(&bin, false).await;

    result.unwrap();
    assert_eq!(stdout, "out\n");
    assert_eq!(stderr, "err\n");

    let calls = std::fs::read_to_string(log).unwrap();
    let calls: Vec<&str> = calls.lines().collect();
    assert_eq!(
        calls.first().copied(),
        Some(
            "create --attach stdin --attach stdout --attach stderr --rm \
             --env A=C alpine --flag value"
        )
    );
    assert!(calls.contains(&"start fake-id"));
    assert!(calls.contains(&"logs --follow fake-id"));
    assert!(calls.contains(&"wait fake-id"));
    assert!(
        !calls.iter().any(|call| call.starts_with("inspect")),
        "logs must not need an extra round trip: {calls:?}"
    );
}

#[tokio::test]
async fn tty_container_output_is_one_stream() {
    let tmp = tempfile::tempdir().unwrap();
    let (bin, _) = FakeDocker {
        logs: "echo out",
        ..FakeDocker::default()
    }
    .install(tmp.path());

    let (result, stdout, stderr) = run(&bin, true).await;

    result.unwrap();
    assert_eq!(stdout, "out\n");
    assert!(stderr.is_empty());
}

#[tokio::test]
async fn exit_code_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let (bin, _) = FakeDocker {
        exit_code: 5,
        ..FakeDocker::default()
    }
    .install(tmp.path());

    let (result, stdout, _) = run(&bin, false).await;

    assert!(matches!(
        result.unwrap_err(),
        PluginError::ExitStatus { code: Some(5), .. }
    ));
    assert_eq!(stdout, "out\n");
}

#[tokio::test]
async fn create_failure_carries_docker_message() {
    let tmp = tempfile::tempdir().unwrap();
    let (bin, _) = FakeDocker {
        create: "echo 'no such image' >&2; exit 1",
        ..FakeDocker::default()
    }
    .install(tmp.path());

    let (result, _, _) = run(&bin, false).await;

    let err = result.unwrap_err();
    assert!(matches!(err, PluginError::ContainerCreate { .. }));
    assert!(err.to_string().contains("no such image"), "got {err}");
}

#[tokio::test]
async fn runtime_calls_map_to_subcommands() {
    let tmp = tempfile::tempdir().unwrap();
    let (bin, log) = FakeDocker::default().install(tmp.path());
    let docker = DockerCli::new(bin.display().to_string());
    let id = ContainerId::new("abc");

    assert_eq!(
        docker.create(&ContainerSpec::new("img")).await.unwrap(),
        ContainerId::new("fake-id")
    );
    docker.kill(&id).await.unwrap();
    docker.remove(&id).await.unwrap();
    assert_eq!(docker.wait(&id).await.unwrap().status_code, 0);

    let calls = std::fs::read_to_string(log).unwrap();
    assert!(calls.contains("kill abc\n"));
    assert!(calls.contains("rm --force abc\n"));
}

#[tokio::test]
async fn failed_subcommand_is_a_request_error() {
    let tmp = tempfile::tempdir().unwrap();
    let (bin, _) = FakeDocker {
        create: "echo 'daemon not running' >&2; exit 1",
        ..FakeDocker::default()
    }
    .install(tmp.path());

    let err = DockerCli::new(bin.display().to_string())
        .create(&ContainerSpec::new("img"))
        .await
        .unwrap_err();

    match err {
        RuntimeError::Request { action, message } => {
            assert_eq!(action, "create");
            assert_eq!(message, "daemon not running");
        },
        other => panic!("unexpected error: {other}"),
    }
}

const NO_SUCH_CONTAINER: &str = "echo 'Error: No such container: fake-id' >&2; exit 1";

#[tokio::test]
async fn failed_log_stream_is_reported_not_forwarded() {
    let tmp = tempfile::tempdir().unwrap();
    let (bin, _) = FakeDocker {
        logs: NO_SUCH_CONTAINER,
        ..FakeDocker::default()
    }
    .install(tmp.path());

    let (result, stdout, stderr) = run(&bin, false).await;

    result.unwrap();
    assert!(stdout.is_empty());
    assert!(stderr.starts_with("error reading container output: "), "stderr: {stderr}");
    assert!(stderr.contains("No such container: fake-id"), "stderr: {stderr}");
    assert_eq!(stderr.lines().count(), 1, "stderr: {stderr}");
}

#[tokio::test]
async fn failed_log_stream_is_reported_for_tty_containers() {
    let tmp = tempfile::tempdir().unwrap();
    let (bin, _) = FakeDocker {
        logs: NO_SUCH_CONTAINER,
        ..FakeDocker::default()
    }
    .install(tmp.path());

    let (result, stdout, stderr) = run(&bin, true).await;

    result.unwrap();
    assert!(stdout.is_empty());
    assert!(stderr.starts_with("error reading container output: "), "stderr: {stderr}");
    assert!(stderr.contains("No such container: fake-id"), "stderr: {stderr}");
}

#[tokio::test]
async fn container_stderr_before_a_clean_exit_is_kept() {
    let tmp = tempfile::tempdir().unwrap();
    let (bin, _) = FakeDocker {
        logs: "echo 'warning: low disk' >&2; echo done",
        ..FakeDocker::default()
    }
    .install(tmp.path());

    let (result, stdout, stderr) = run(&bin, false).await;

    result.unwrap();
    assert_eq!(stdout, "done\n");
    assert_eq!(stderr, "warning: low disk\n");
}
