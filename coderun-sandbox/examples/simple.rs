//! Simple sandbox example - run a few cells through the shell environment

use coderun_sandbox::{
    CodeInput, Environment, EnvironmentRegistry, ExecutionRequest, ExecutionService, FileStore,
    ProcessRuntime,
};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let bash = Environment {
        tag: "bash".to_string(),
        display_name: "Shell".to_string(),
        language: "bash".to_string(),
        program: PathBuf::from("/bin/sh"),
        args: vec!["-c".to_string()],
        input: CodeInput::Argument,
        ecosystem: None,
    };
    let registry = EnvironmentRegistry::from_environments([bash], "python3")?;
    let files = tempfile::tempdir()?;
    let store = FileStore::new(files.path(), "http://127.0.0.1:8080")?;
    let service = ExecutionService::new(Arc::new(registry), ProcessRuntime::new(), store);

    println!("=== Sandbox Service Example ===\n");

    println!("Example 1: Simple echo");
    run(&service, ExecutionRequest::new("echo 'Hello from sandbox!'", "example")).await?;

    println!("\nExample 2: Write a file");
    run(&service, ExecutionRequest::new("echo 'a,b' > table.csv", "example")).await?;

    println!("\nExample 3: Silent for longer than the timeout");
    run(&service, ExecutionRequest::new("sleep 10", "example").with_timeout(2)).await?;

    println!("\nExample 4: Error to stderr");
    run(&service, ExecutionRequest::new("echo 'Error message' >&2; exit 1", "example")).await?;

    Ok(())
}

async fn run(service: &ExecutionService, request: ExecutionRequest) -> anyhow::Result<()> {
    let outcome = service.execute(request.with_environment("bash")).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
