//! End-to-end request handling through ExecutionService

use crate::common::{
    busy, idle, scripted_service, setup_test_logging, shell_service, ScriptedLauncher,
};
use assert_matches::assert_matches;
use coderun_sandbox::{ErrorField, ExecutionRequest, ProtocolMessage, TIMEOUT_NOTE};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_simple_result_is_returned() {
    setup_test_logging();
    let launcher = ScriptedLauncher::new(|_| {
        vec![busy(), ProtocolMessage::plain_result("'hi'"), idle()]
    });
    let ts = scripted_service(launcher.clone());

    let outcome = ts
        .service
        .execute(ExecutionRequest::new("'hi'", "alice").with_environment("python"))
        .await;

    assert_eq!(outcome.output.as_deref(), Some("'hi'"));
    assert_eq!(outcome.error, Some(ErrorField::Flag(false)));
    assert!(!outcome.timedout);
    assert!(outcome.files.is_none());
    assert_eq!(launcher.executed(), vec!["'hi'".to_string()]);
}

#[tokio::test]
async fn test_error_traceback_is_sanitized() {
    setup_test_logging();
    let launcher = ScriptedLauncher::new(|_| {
        vec![
            ProtocolMessage::error(
                "SyntaxError",
                "invalid syntax",
                vec![
                    "\x1b[0;36m  Cell In[1], line 1\x1b[0m".to_string(),
                    "\x1b[0;31mSyntaxError\x1b[0m: invalid syntax".to_string(),
                ],
            ),
            idle(),
        ]
    });
    let ts = scripted_service(launcher);

    let outcome = ts
        .service
        .execute(ExecutionRequest::new("def (", "alice").with_environment("python"))
        .await;

    assert_eq!(outcome.error, Some(ErrorField::Flag(true)));
    let output = outcome.output.unwrap();
    assert_eq!(output, "Cell In[1], line 1\nSyntaxError: invalid syntax");
    assert!(!output.contains('\x1b'));
}

#[tokio::test]
async fn test_generated_file_is_persisted_and_linked() {
    setup_test_logging();
    let ts = shell_service();

    let outcome = ts
        .service
        .execute(
            ExecutionRequest::new("printf 'PNGDATA' > out.png; echo done", "alice")
                .with_environment("bash"),
        )
        .await;

    assert_eq!(outcome.output.as_deref(), Some("done"));
    assert_eq!(outcome.error, Some(ErrorField::Flag(false)));

    let files = outcome.files.expect("one file link");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "out.png");
    assert!(files[0]
        .url
        .starts_with("http://127.0.0.1:8080/jupyter/files/out-"));
    assert!(files[0].url.ends_with(".png"));

    let stored_name = files[0].url.rsplit('/').next().unwrap();
    let stored = std::fs::read(ts.files.path().join(stored_name)).unwrap();
    assert_eq!(stored, b"PNGDATA");
}

#[tokio::test]
async fn test_workdir_removed_after_request() {
    setup_test_logging();
    let launcher = ScriptedLauncher::new(|_| vec![ProtocolMessage::stdout("ok"), idle()]);
    let ts = scripted_service(launcher.clone());

    let outcome = ts
        .service
        .execute(ExecutionRequest::new("print('ok')", "alice").with_environment("python"))
        .await;

    assert_eq!(outcome.output.as_deref(), Some("ok"));
    let workdirs = launcher.workdirs();
    assert_eq!(workdirs.len(), 1);
    assert!(!workdirs[0].exists());
}

#[tokio::test]
async fn test_each_request_gets_its_own_workdir() {
    setup_test_logging();
    let ts = shell_service();

    let first = ts
        .service
        .execute(ExecutionRequest::new("echo a > left.txt", "alice").with_environment("bash"))
        .await;
    let second = ts
        .service
        .execute(ExecutionRequest::new("ls", "bob").with_environment("bash"))
        .await;

    assert_eq!(first.files.map(|f| f.len()), Some(1));
    assert_eq!(second.output.as_deref(), Some(""));
    assert!(second.files.is_none());
}

#[tokio::test]
async fn test_base_environment_is_refused() {
    setup_test_logging();
    let launcher = ScriptedLauncher::new(|_| vec![idle()]);
    let ts = scripted_service(launcher.clone());

    let outcome = ts
        .service
        .execute(ExecutionRequest::new("1 + 1", "alice").with_environment("python3"))
        .await;

    assert_eq!(
        outcome.error,
        Some(ErrorField::Message(
            "Base environment is not supported for code execution".to_string()
        ))
    );
    assert!(outcome.output.is_none());
    assert!(launcher.workdirs().is_empty());
}

#[tokio::test]
async fn test_empty_code_is_refused() {
    setup_test_logging();
    let launcher = ScriptedLauncher::new(|_| vec![idle()]);
    let ts = scripted_service(launcher.clone());

    let outcome = ts
        .service
        .execute(ExecutionRequest::new("", "alice").with_environment("python"))
        .await;

    assert_eq!(
        outcome.error,
        Some(ErrorField::Message("No code provided to run".to_string()))
    );
    assert!(launcher.executed().is_empty());
}

#[tokio::test]
async fn test_silent_kernel_times_out() {
    setup_test_logging();
    let launcher = ScriptedLauncher::new(|_| Vec::new());
    let ts = scripted_service(launcher);

    let started = Instant::now();
    let outcome = ts
        .service
        .execute(
            ExecutionRequest::new("while True: pass", "alice")
                .with_environment("python")
                .with_timeout(2),
        )
        .await;

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(outcome.timedout);
    assert_eq!(outcome.error, Some(ErrorField::Flag(true)));
    assert_eq!(outcome.output.as_deref(), Some(TIMEOUT_NOTE));
}

#[tokio::test]
async fn test_real_process_timeout_is_killed() {
    setup_test_logging();
    let ts = shell_service();

    let started = Instant::now();
    let outcome = ts
        .service
        .execute(
            ExecutionRequest::new("echo start; sleep 30", "alice")
                .with_environment("bash")
                .with_timeout(2),
        )
        .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(outcome.timedout);
    let output = outcome.output.unwrap();
    assert!(output.starts_with("start"));
    assert!(output.ends_with(TIMEOUT_NOTE));
}

#[tokio::test]
async fn test_unknown_environment_is_unexpected_error() {
    setup_test_logging();
    let launcher = ScriptedLauncher::new(|_| vec![idle()]);
    let ts = scripted_service(launcher);

    let outcome = ts
        .service
        .execute(ExecutionRequest::new("1", "alice").with_environment("java"))
        .await;

    assert_matches!(
        outcome.error,
        Some(ErrorField::Message(ref m)) if m.starts_with("An error occurred: ")
    );
    assert!(outcome.stacktrace.is_some());
}

#[tokio::test]
async fn test_attachment_is_visible_to_code() {
    setup_test_logging();
    let ts = shell_service();

    let request = ExecutionRequest::new("cat input.csv", "alice")
        .with_environment("bash")
        .with_attachment(coderun_sandbox::FileUpload::from_bytes(
            "input", "csv", b"a,b",
        ));
    let outcome = ts.service.execute(request).await;

    assert_eq!(outcome.output.as_deref(), Some("a,b"));
    assert_eq!(outcome.error, Some(ErrorField::Flag(false)));
}

#[tokio::test]
async fn test_outcome_serializes_wire_shape() {
    setup_test_logging();
    let launcher = ScriptedLauncher::new(|_| vec![ProtocolMessage::stdout("4"), idle()]);
    let ts = scripted_service(launcher);

    let outcome = ts
        .service
        .execute(ExecutionRequest::new("2 + 2", "alice").with_environment("python"))
        .await;
    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(json["output"], "4");
    assert_eq!(json["error"], false);
    assert_eq!(json["timedout"], false);
    assert!(json["files"].is_null());
}

#[tokio::test]
async fn test_stderr_progress_keeps_cell_alive() {
    setup_test_logging();
    let ts = shell_service();

    let outcome = ts
        .service
        .execute(
            ExecutionRequest::new(
                "for i in 1 2 3 4; do echo tick $i >&2; sleep 1; done",
                "alice",
            )
            .with_environment("bash")
            .with_timeout(2),
        )
        .await;

    assert!(!outcome.timedout);
    assert_eq!(outcome.error, Some(ErrorField::Flag(false)));
    assert_eq!(
        outcome.output.as_deref(),
        Some("tick 1\ntick 2\ntick 3\ntick 4")
    );
}

#[tokio::test]
async fn test_leading_bang_is_not_a_shell_escape() {
    setup_test_logging();
    let ts = shell_service();

    let outcome = ts
        .service
        .execute(ExecutionRequest::new("! false", "alice").with_environment("bash"))
        .await;

    // `! false` succeeds in sh; run as a shell escape it would be `false`
    assert_eq!(outcome.error, Some(ErrorField::Flag(false)));
}
