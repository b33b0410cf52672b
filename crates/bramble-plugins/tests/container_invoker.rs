use std::sync::Arc;
use std::time::Duration;

use bramble_plugins::runtime::frame::StreamKind;
use bramble_plugins::testing::{RuntimeCall, ScriptedRuntime, capture_streams};
use bramble_plugins::{
    ContainerInvoker, InvocationContext, Invoker, InvokerKind, InvokerSpec, Manifest, PluginError,
};
use tokio_util::sync::CancellationToken;

fn container_manifest(tty: bool) -> Manifest {
    Manifest::new(
        vec!["db".to_owned(), "run".to_owned()],
        InvokerSpec::Container {
            image: "alpine".to_owned(),
            tty,
        },
    )
    .unwrap()
}

async fn invoke(
    runtime: &Arc<ScriptedRuntime>,
    manifest: &Manifest,
    ctx: &InvocationContext,
    cancel: &CancellationToken,
) -> (Result<(), PluginError>, String, String) {
    let (streams, stdout, stderr) = capture_streams();
    let invoker = ContainerInvoker::new(Arc::clone(runtime) as _, streams);
    let result = invoker.invoke(manifest, ctx, cancel).await;
    (result, stdout.contents(), stderr.contents())
}

#[tokio::test]
async fn separates_stdout_and_stderr_and_drains_before_returning() {
    let runtime = Arc::new(ScriptedRuntime::new().with_frames(&[
        (StreamKind::Stdout, "out"),
        (StreamKind::Stderr, "err"),
    ]));

    let (result, stdout, stderr) = invoke(
        &runtime,
        &container_manifest(false),
        &InvocationContext::default(),
        &CancellationToken::new(),
    )
    .await;

    result.unwrap();
    assert_eq!(stdout, "out");
    assert_eq!(stderr, "err");
    assert_eq!(
        runtime.calls(),
        [
            RuntimeCall::Create,
            RuntimeCall::Start,
            RuntimeCall::Logs,
            RuntimeCall::Wait
        ]
    );
}

#[tokio::test]
async fn long_output_is_complete_when_invoke_returns() {
    let lines: Vec<String> = (0..200).map(|i| format!("line {i}\n")).collect();
    let frames: Vec<(StreamKind, &str)> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let kind = if i % 2 == 0 {
                StreamKind::Stdout
            } else {
                StreamKind::Stderr
            };
            (kind, line.as_str())
        })
        .collect();
    let runtime = Arc::new(ScriptedRuntime::new().with_frames(&frames));

    let (result, stdout, stderr) = invoke(
        &runtime,
        &container_manifest(false),
        &InvocationContext::default(),
        &CancellationToken::new(),
    )
    .await;

    result.unwrap();
    assert_eq!(stdout.lines().count(), 100);
    assert_eq!(stderr.lines().count(), 100);
    assert!(stdout.ends_with("line 198\n"));
    assert!(stderr.ends_with("line 199\n"));
}

#[tokio::test]
async fn tty_output_is_copied_verbatim() {
    let raw = b"\x01\x00raw terminal bytes\r\n".to_vec();
    let runtime = Arc::new(ScriptedRuntime::new().with_output(raw.clone()));

    let (result, stdout, stderr) = invoke(
        &runtime,
        &container_manifest(true),
        &InvocationContext::default(),
        &CancellationToken::new(),
    )
    .await;

    result.unwrap();
    assert_eq!(stdout.as_bytes(), raw.as_slice());
    assert!(stderr.is_empty());
}

#[tokio::test]
async fn log_request_carries_the_tty_flag() {
    for tty in [false, true] {
        let runtime = Arc::new(ScriptedRuntime::new());
        let (result, _, _) = invoke(
            &runtime,
            &container_manifest(tty),
            &InvocationContext::default(),
            &CancellationToken::new(),
        )
        .await;
        result.unwrap();

        let requests = runtime.log_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tty, tty);
        assert!(requests[0].follow && requests[0].stdout && requests[0].stderr);
    }
}

#[tokio::test]
async fn container_gets_args_env_and_tty() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let ctx = InvocationContext::new(vec!["--flag".to_owned(), "value".to_owned()])
        .with_env("A", "C");

    let (result, _, _) = invoke(
        &runtime,
        &container_manifest(true),
        &ctx,
        &CancellationToken::new(),
    )
    .await;
    result.unwrap();

    let specs = runtime.created_specs();
    assert_eq!(specs.len(), 1);
    let spec = &specs[0];
    assert_eq!(spec.image, "alpine");
    assert_eq!(spec.cmd, ["--flag", "value"]);
    assert_eq!(spec.env.get("A").map(String::as_str), Some("C"));
    assert!(spec.tty);
    assert!(spec.auto_remove);
    assert!(spec.attach_stdin && spec.attach_stdout && spec.attach_stderr);
}

#[tokio::test]
async fn create_failure_is_reported_without_retry() {
    let runtime = Arc::new(ScriptedRuntime::new().failing(RuntimeCall::Create));

    let (result, _, _) = invoke(
        &runtime,
        &container_manifest(false),
        &InvocationContext::default(),
        &CancellationToken::new(),
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, PluginError::ContainerCreate { .. }));
    assert!(err.to_string().starts_with("unable to create container 'alpine'"));
    assert_eq!(runtime.calls(), [RuntimeCall::Create]);
}

#[tokio::test]
async fn start_failure_removes_the_container() {
    let runtime = Arc::new(ScriptedRuntime::new().failing(RuntimeCall::Start));

    let (result, _, _) = invoke(
        &runtime,
        &container_manifest(false),
        &InvocationContext::default(),
        &CancellationToken::new(),
    )
    .await;

    let err = result.unwrap_err();
    assert!(err.to_string().starts_with("unable to run container 'alpine'"));
    assert_eq!(
        runtime.calls(),
        [RuntimeCall::Create, RuntimeCall::Start, RuntimeCall::Remove]
    );
}

#[tokio::test]
async fn failed_cleanup_does_not_mask_start_failure() {
    let runtime = Arc::new(
        ScriptedRuntime::new()
            .failing(RuntimeCall::Start)
            .failing(RuntimeCall::Remove),
    );

    let (result, _, _) = invoke(
        &runtime,
        &container_manifest(false),
        &InvocationContext::default(),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(
        result.unwrap_err(),
        PluginError::ContainerStart { .. }
    ));
}

#[tokio::test]
async fn wait_failure_still_drains_output() {
    let runtime = Arc::new(
        ScriptedRuntime::new()
            .with_frames(&[(StreamKind::Stdout, "partial")])
            .failing(RuntimeCall::Wait),
    );

    let (result, stdout, _) = invoke(
        &runtime,
        &container_manifest(false),
        &InvocationContext::default(),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(
        result.unwrap_err(),
        PluginError::ContainerWait { .. }
    ));
    assert_eq!(stdout, "partial");
    assert!(runtime.calls().contains(&RuntimeCall::Kill));
}

#[tokio::test]
async fn wait_outcome_error_is_a_wait_failure() {
    let runtime = Arc::new(ScriptedRuntime::new().with_wait_error("container vanished"));

    let (result, _, _) = invoke(
        &runtime,
        &container_manifest(false),
        &InvocationContext::default(),
        &CancellationToken::new(),
    )
    .await;

    match result.unwrap_err() {
        PluginError::ContainerWait { image, message } => {
            assert_eq!(image, "alpine");
            assert_eq!(message, "container vanished");
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn non_zero_exit_is_an_error_after_output() {
    let runtime = Arc::new(
        ScriptedRuntime::new()
            .with_frames(&[(StreamKind::Stderr, "boom\n")])
            .with_exit_code(2),
    );

    let (result, _, stderr) = invoke(
        &runtime,
        &container_manifest(false),
        &InvocationContext::default(),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(
        result.unwrap_err(),
        PluginError::ExitStatus { code: Some(2), .. }
    ));
    assert_eq!(stderr, "boom\n");
}

#[tokio::test]
async fn log_stream_failure_is_reported_but_not_fatal() {
    let runtime = Arc::new(ScriptedRuntime::new().failing(RuntimeCall::Logs));

    let (result, stdout, stderr) = invoke(
        &runtime,
        &container_manifest(false),
        &InvocationContext::default(),
        &CancellationToken::new(),
    )
    .await;

    result.unwrap();
    assert!(stdout.is_empty());
    assert!(stderr.contains("unable to stream container output"));
}

#[tokio::test]
async fn corrupt_stream_is_reported_but_not_fatal() {
    let runtime = Arc::new(ScriptedRuntime::new().with_output(vec![9u8, 0, 0, 0, 0, 0, 0, 1, b'x']));

    let (result, _, stderr) = invoke(
        &runtime,
        &container_manifest(false),
        &InvocationContext::default(),
        &CancellationToken::new(),
    )
    .await;

    result.unwrap();
    assert!(stderr.contains("error reading container output"), "stderr: {stderr}");
}

#[tokio::test]
async fn cancellation_kills_the_container() {
    let runtime = Arc::new(
        ScriptedRuntime::new()
            .with_frames(&[(StreamKind::Stdout, "started\n")])
            .hanging(),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let (result, stdout, _) = tokio::time::timeout(
        Duration::from_secs(10),
        invoke(
            &runtime,
            &container_manifest(false),
            &InvocationContext::default(),
            &cancel,
        ),
    )
    .await
    .unwrap();

    assert!(matches!(result.unwrap_err(), PluginError::Cancelled { .. }));
    assert_eq!(stdout, "started\n");
    assert!(runtime.calls().contains(&RuntimeCall::Kill));
}

#[tokio::test]
async fn cancellation_returns_even_if_kill_fails() {
    let runtime = Arc::new(ScriptedRuntime::new().hanging().failing(RuntimeCall::Kill));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (result, _, _) = tokio::time::timeout(
        Duration::from_secs(10),
        invoke(
            &runtime,
            &container_manifest(false),
            &InvocationContext::default(),
            &cancel,
        ),
    )
    .await
    .unwrap();

    assert!(matches!(result.unwrap_err(), PluginError::Cancelled { .. }));
}

#[tokio::test]
async fn executable_manifest_is_rejected() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let manifest = Manifest::new(
        vec!["tool".to_owned()],
        InvokerSpec::Executable {
            exec: "tool-bin".to_owned(),
        },
    )
    .unwrap();

    let (result, _, _) = invoke(
        &runtime,
        &manifest,
        &InvocationContext::default(),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(
        result.unwrap_err(),
        PluginError::InvokerMismatch {
            expected: InvokerKind::Container,
            actual: InvokerKind::Executable,
        }
    ));
    assert!(runtime.calls().is_empty());
}
