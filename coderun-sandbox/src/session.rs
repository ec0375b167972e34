//! Execution session: one runtime process and one private working directory

use crate::artifacts;
use crate::collector::{self, CellOutput, Completion};
use crate::error::{Result, SandboxError};
use crate::installer::{self, InstallFailure};
use crate::registry::{Environment, EnvironmentRegistry};
use crate::runtime::{Kernel, KernelLauncher};
use crate::types::{FileUpload, RunOutput};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Binds a kernel to a fresh working directory for a single request.
///
/// Sessions are never shared or reused. Call [`terminate`](Self::terminate)
/// when the request is done; dropping an unterminated session still kills the
/// runtime process and removes the directory.
pub struct ExecutionSession {
    environment: Environment,
    workdir: Option<TempDir>,
    kernel: Option<Box<dyn Kernel>>,
}

impl ExecutionSession {
    /// Create a session for `tag`. The base environment is refused before
    /// anything is spawned.
    pub fn create(
        registry: &EnvironmentRegistry,
        tag: &str,
        launcher: &dyn KernelLauncher,
    ) -> Result<Self> {
        if registry.is_base(tag) {
            return Err(SandboxError::EnvironmentUnsupported(tag.to_string()));
        }
        let environment = registry
            .get(tag)
            .ok_or_else(|| SandboxError::UnknownEnvironment(tag.to_string()))?
            .clone();

        let workdir = tempfile::Builder::new().prefix("coderun-").tempdir()?;
        let kernel = launcher.launch(&environment, workdir.path())?;

        tracing::info!(
            environment = %environment.tag,
            runtime = launcher.name(),
            workdir = %workdir.path().display(),
            "Created execution session"
        );

        Ok(Self {
            environment,
            workdir: Some(workdir),
            kernel: Some(kernel),
        })
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_ref().map(TempDir::path)
    }

    fn parts(&mut self) -> Result<(&mut (dyn Kernel + 'static), &Path)> {
        match (self.kernel.as_deref_mut(), self.workdir.as_ref()) {
            (Some(kernel), Some(workdir)) => Ok((kernel, workdir.path())),
            _ => Err(SandboxError::SessionTerminated),
        }
    }

    /// Write request attachments into the working directory
    pub async fn stage(&self, attachments: &[FileUpload]) -> Result<()> {
        let workdir = self.workdir().ok_or(SandboxError::SessionTerminated)?;
        for upload in attachments {
            let name = upload.full_filename();
            if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
                return Err(SandboxError::Validation(format!(
                    "Invalid attachment name: {}",
                    name
                )));
            }
            tokio::fs::write(workdir.join(&name), upload.decoded_content()?).await?;
        }
        Ok(())
    }

    /// Execute `code`, then harvest whatever files it left behind.
    ///
    /// A cell that did not finish is stopped before the harvest so no file
    /// is read while it is still being written.
    pub async fn run(&mut self, code: &str, timeout: Duration) -> Result<RunOutput> {
        let (kernel, workdir) = self.parts()?;
        let cell = collector::drive(&mut *kernel, code, timeout).await?;
        if cell.completion != Completion::Normal {
            kernel.interrupt().await;
        }
        let artifacts = artifacts::capture(workdir).await?;

        Ok(RunOutput {
            text: cell.text,
            error: cell.error,
            artifacts,
            timed_out: cell.timed_out,
        })
    }

    /// Run a shell command in the working directory. Files are left in place.
    pub async fn run_shell(&mut self, command: &str, timeout: Duration) -> Result<CellOutput> {
        let (kernel, _) = self.parts()?;
        let cell = collector::drive_shell(&mut *kernel, command, timeout).await?;
        if cell.completion != Completion::Normal {
            kernel.interrupt().await;
        }
        Ok(cell)
    }

    /// Install packages ahead of the code. `None` means every package installed.
    pub async fn install(
        &mut self,
        packages: &[String],
        timeout: Duration,
    ) -> Result<Option<InstallFailure>> {
        installer::install(self, packages, timeout).await
    }

    /// Stop the runtime and delete the working directory. Idempotent.
    pub async fn terminate(&mut self) {
        if let Some(mut kernel) = self.kernel.take() {
            kernel.shutdown().await;
        }
        if let Some(workdir) = self.workdir.take() {
            let path = workdir.path().to_path_buf();
            if let Err(e) = workdir.close() {
                tracing::warn!(workdir = %path.display(), "Failed to remove working directory: {}", e);
            } else {
                tracing::debug!(workdir = %path.display(), "Session terminated");
            }
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.kernel.is_none() && self.workdir.is_none()
    }
}

impl Drop for ExecutionSession {
    fn drop(&mut self) {
        if !self.is_terminated() {
            tracing::warn!(
                environment = %self.environment.tag,
                "Execution session dropped without terminate, cleaning up"
            );
        }
        // Kernel drop cancels its processes, TempDir drop removes the directory
        self.kernel.take();
        self.workdir.take();
    }
}
