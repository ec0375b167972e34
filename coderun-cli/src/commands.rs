//! CLI command implementations

use anyhow::{anyhow, Context, Result};
use coderun_sandbox::{
    sweep_dir, AppConfig, ExecutionRequest, ExecutionService, FileStore, FileSweeper, FileUpload,
    Lifetime,
};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::info;

/// Arguments of the `run` command
pub struct RunArgs {
    pub code: Option<String>,
    pub file: Option<PathBuf>,
    pub env: String,
    pub timeout: Option<u64>,
    pub packages: Vec<String>,
    pub attachments: Vec<PathBuf>,
    pub user: String,
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = AppConfig::load(path).context("Failed to load configuration")?;
    if let Some(path) = path {
        info!("Loaded configuration from {}", path.display());
    }
    Ok(config)
}

/// Execute serve command
///
/// Fails at startup when no environment is usable on this host.
pub async fn execute_serve(config: AppConfig) -> Result<()> {
    let service =
        ExecutionService::from_config(&config).context("Failed to start execution service")?;

    for (tag, env) in service.environments() {
        info!(environment = %tag, language = %env.language, "Environment available");
    }

    let sweeper = FileSweeper::new(
        service.store().dir(),
        config.storage.ttl_policy(),
        config.storage.sweep_interval,
    )
    .spawn();

    info!(
        files_dir = %config.storage.files_dir.display(),
        public_url = %config.server.public_url(),
        "Service ready, press ctrl-c to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down");
    sweeper.shutdown().await;
    Ok(())
}

/// Execute run command
pub async fn execute_run(config: AppConfig, args: RunArgs) -> Result<()> {
    let code = match (args.code, args.file) {
        (Some(code), _) => code,
        (None, Some(file)) => tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?,
        (None, None) => return Err(anyhow!("Either code or --file is required")),
    };

    let mut request = ExecutionRequest::new(code, args.user)
        .with_environment(args.env)
        .with_timeout(args.timeout.unwrap_or(config.execution.default_timeout));
    if !args.packages.is_empty() {
        request = request.with_packages(args.packages);
    }
    for path in &args.attachments {
        request = request.with_attachment(read_upload(path).await?);
    }
    let request = request.validate().context("Invalid request")?;

    let service =
        ExecutionService::from_config(&config).context("Failed to start execution service")?;
    let outcome = service.execute(request).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

/// Execute envs command
pub fn execute_envs(config: AppConfig) -> Result<()> {
    let service =
        ExecutionService::from_config(&config).context("Failed to start execution service")?;
    println!("{}", serde_json::to_string_pretty(&service.environments())?);
    Ok(())
}

/// Execute upload command
pub async fn execute_upload(config: AppConfig, path: PathBuf, long: bool) -> Result<()> {
    let store = FileStore::new(&config.storage.files_dir, &config.server.public_url())
        .context("Failed to open file store")?;
    let upload = read_upload(&path).await?;
    let lifetime = if long { Lifetime::Long } else { Lifetime::Short };

    let url = store
        .upload(&upload, lifetime)
        .await
        .with_context(|| format!("Failed to store {}", path.display()))?;

    info!(filename = %upload.full_filename(), ?lifetime, "Uploaded file");
    println!("{}", url);
    Ok(())
}

/// Execute sweep command
pub async fn execute_sweep(config: AppConfig) -> Result<()> {
    let report = sweep_dir(
        &config.storage.files_dir,
        &config.storage.ttl_policy(),
        SystemTime::now(),
    )
    .await
    .with_context(|| {
        format!(
            "Failed to sweep {}",
            config.storage.files_dir.display()
        )
    })?;

    println!("✓ Removed {} expired file(s), kept {}", report.removed, report.retained);
    Ok(())
}

async fn read_upload(path: &Path) -> Result<FileUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("Not a file path: {}", path.display()))?;
    let extension = path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(FileUpload::from_bytes(stem, extension, &bytes))
}
