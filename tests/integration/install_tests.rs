//! Package installation ahead of user code

use crate::common::{
    idle, runtime_service, scripted_service, setup_test_logging, ScriptedLauncher,
};
use coderun_sandbox::{ErrorField, ExecutionRequest, FileUpload, ProcessRuntime, ProtocolMessage};

fn pip_rejects(bad: &'static str) -> ScriptedLauncher {
    ScriptedLauncher::new(move |code| {
        if code.starts_with("$ pip install") && code.contains(bad) {
            vec![
                ProtocolMessage::error(
                    "CalledProcessError",
                    "pip failed",
                    vec![format!("ERROR: No matching distribution found for {}", bad)],
                ),
                idle(),
            ]
        } else {
            vec![ProtocolMessage::stdout("ok"), idle()]
        }
    })
}

#[tokio::test]
async fn test_failed_install_skips_user_code() {
    setup_test_logging();
    let launcher = pip_rejects("not-a-real-package");
    let ts = scripted_service(launcher.clone());

    let outcome = ts
        .service
        .execute(
            ExecutionRequest::new("import requests", "alice")
                .with_environment("python")
                .with_packages(["requests", "not-a-real-package", "numpy"]),
        )
        .await;

    assert_eq!(outcome.error, Some(ErrorField::Flag(true)));
    assert!(outcome.output.is_none());
    assert!(!outcome.timedout);
    assert!(outcome
        .stacktrace
        .unwrap()
        .contains("No matching distribution found for not-a-real-package"));

    assert_eq!(
        launcher.executed(),
        vec![
            "$ pip install 'requests'".to_string(),
            "$ pip install 'not-a-real-package'".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_successful_installs_then_code() {
    setup_test_logging();
    let launcher = pip_rejects("never");
    let ts = scripted_service(launcher.clone());

    let outcome = ts
        .service
        .execute(
            ExecutionRequest::new("import numpy", "alice")
                .with_environment("python")
                .with_packages(["numpy"]),
        )
        .await;

    assert_eq!(outcome.error, Some(ErrorField::Flag(false)));
    assert_eq!(outcome.output.as_deref(), Some("ok"));
    assert_eq!(launcher.executed().len(), 2);
    assert_eq!(launcher.executed()[1], "import numpy");
}

#[tokio::test]
async fn test_environment_without_installer() {
    setup_test_logging();
    let launcher = pip_rejects("never");
    let ts = scripted_service(launcher.clone());

    let outcome = ts
        .service
        .execute(
            ExecutionRequest::new("echo hi", "alice")
                .with_environment("bash")
                .with_packages(["jq"]),
        )
        .await;

    assert_eq!(
        outcome.error,
        Some(ErrorField::Message(
            "Installations of additional packages is not supported for kernel bash".to_string()
        ))
    );
    assert!(launcher.executed().is_empty());
}

#[tokio::test]
async fn test_silent_install_reports_timeout() {
    setup_test_logging();
    let launcher = ScriptedLauncher::new(|code| {
        if code.starts_with("$ pip") {
            Vec::new()
        } else {
            vec![idle()]
        }
    });
    let ts = scripted_service(launcher.clone());

    let outcome = ts
        .service
        .execute(
            ExecutionRequest::new("import torch", "alice")
                .with_environment("python")
                .with_timeout(2)
                .with_packages(["torch"]),
        )
        .await;

    assert!(outcome.timedout);
    assert_eq!(outcome.error, Some(ErrorField::Flag(true)));
    assert_eq!(launcher.executed(), vec!["$ pip install 'torch'".to_string()]);
}

#[tokio::test]
async fn test_empty_package_list_is_ignored() {
    setup_test_logging();
    let launcher = pip_rejects("never");
    let ts = scripted_service(launcher.clone());

    let outcome = ts
        .service
        .execute(
            ExecutionRequest::new("echo hi", "alice")
                .with_environment("bash")
                .with_packages(Vec::<String>::new()),
        )
        .await;

    assert_eq!(outcome.output.as_deref(), Some("ok"));
    assert_eq!(launcher.executed(), vec!["echo hi".to_string()]);
}

#[tokio::test]
async fn test_attachments_survive_installs() {
    setup_test_logging();
    // Every install succeeds without output
    let ts = runtime_service(ProcessRuntime::with_shell("/bin/true"));

    let outcome = ts
        .service
        .execute(
            ExecutionRequest::new("cat input.csv", "alice")
                .with_environment("python")
                .with_packages(["requests"])
                .with_attachment(FileUpload::from_bytes("input", "csv", b"a,b")),
        )
        .await;

    assert_eq!(outcome.output.as_deref(), Some("a,b"));
    assert_eq!(outcome.error, Some(ErrorField::Flag(false)));
}
