//! Uploads, served URLs and file expiry

use crate::common::{scripted_service, setup_test_logging, ScriptedLauncher, PUBLIC_URL};
use coderun_sandbox::{
    sweep_dir, ErrorField, ExecutionRequest, FileSweeper, FileUpload, Lifetime, SweepReport,
    TtlPolicy,
};
use std::time::{Duration, SystemTime};

#[tokio::test]
async fn test_upload_round_trip() {
    setup_test_logging();
    let ts = scripted_service(ScriptedLauncher::new(|_| Vec::new()));
    let bytes: Vec<u8> = (0..=255u8).collect();

    let url = ts
        .service
        .upload(&FileUpload::from_bytes("weights", "bin", &bytes), Lifetime::Short)
        .await
        .unwrap();

    assert!(url.starts_with(&format!("{}/jupyter/files/weights-", PUBLIC_URL)));
    let stored_name = url.rsplit('/').next().unwrap();
    assert_eq!(std::fs::read(ts.files.path().join(stored_name)).unwrap(), bytes);
}

#[tokio::test]
async fn test_long_upload_survives_short_sweep() {
    setup_test_logging();
    let ts = scripted_service(ScriptedLauncher::new(|_| Vec::new()));

    let long_url = ts
        .service
        .upload(&FileUpload::from_bytes("keep", "txt", b"k"), Lifetime::Long)
        .await
        .unwrap();
    let short_url = ts
        .service
        .upload(&FileUpload::from_bytes("drop", "txt", b"d"), Lifetime::Short)
        .await
        .unwrap();
    assert!(long_url.contains("keep-long-"));

    let in_an_hour = SystemTime::now() + Duration::from_secs(3600);
    let report = sweep_dir(ts.files.path(), &TtlPolicy::default(), in_an_hour)
        .await
        .unwrap();

    assert_eq!(report, SweepReport { removed: 1, retained: 1 });
    let name = |url: &str| url.rsplit('/').next().unwrap().to_string();
    assert!(ts.files.path().join(name(&long_url)).exists());
    assert!(!ts.files.path().join(name(&short_url)).exists());
}

#[tokio::test]
async fn test_plain_text_upload() {
    setup_test_logging();
    let ts = scripted_service(ScriptedLauncher::new(|_| Vec::new()));
    let upload = FileUpload {
        filename: "notes".to_string(),
        extension: "md".to_string(),
        content: "# title".to_string(),
        base64encoded: false,
    };

    let url = ts.service.upload(&upload, Lifetime::Short).await.unwrap();

    let stored_name = url.rsplit('/').next().unwrap();
    assert_eq!(
        std::fs::read_to_string(ts.files.path().join(stored_name)).unwrap(),
        "# title"
    );
}

#[tokio::test]
async fn test_background_sweeper_expires_persisted_artifacts() {
    setup_test_logging();
    let ts = crate::common::shell_service();

    let outcome = ts
        .service
        .execute(ExecutionRequest::new("echo x > out.txt", "alice").with_environment("bash"))
        .await;
    assert_eq!(outcome.error, Some(ErrorField::Flag(false)));
    assert_eq!(std::fs::read_dir(ts.files.path()).unwrap().count(), 1);

    let policy = TtlPolicy {
        short: Duration::ZERO,
        long: Duration::from_secs(3600),
    };
    let handle = FileSweeper::new(ts.files.path(), policy, Duration::from_millis(100)).spawn();

    let mut emptied = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if std::fs::read_dir(ts.files.path()).unwrap().count() == 0 {
            emptied = true;
            break;
        }
    }
    handle.shutdown().await;
    assert!(emptied, "sweeper never removed the artifact");
}

#[tokio::test]
async fn test_environment_listing_hides_base() {
    let ts = scripted_service(ScriptedLauncher::new(|_| Vec::new()));

    let envs = ts.service.environments();

    assert!(envs.contains_key("python"));
    assert!(envs.contains_key("bash"));
    assert!(!envs.contains_key("python3"));
    assert_eq!(ts.service.health().status, "ok");
}
