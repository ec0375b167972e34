//! Execution service - main entry point

use crate::config::AppConfig;
use crate::error::SandboxError;
use crate::registry::{EnvironmentInfo, EnvironmentRegistry};
use crate::runtime::{KernelLauncher, ProcessRuntime};
use crate::session::ExecutionSession;
use crate::store::{FileStore, Lifetime};
use crate::types::{ErrorField, ExecutionOutcome, ExecutionRequest, FileUpload, Health};
use crate::Result;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Runs requests end to end: session, installs, code, artifacts, teardown
pub struct ExecutionService {
    registry: Arc<EnvironmentRegistry>,
    launcher: Arc<dyn KernelLauncher>,
    store: FileStore,
}

impl ExecutionService {
    pub fn new(
        registry: Arc<EnvironmentRegistry>,
        launcher: impl KernelLauncher + 'static,
        store: FileStore,
    ) -> Self {
        Self {
            registry,
            launcher: Arc::new(launcher),
            store,
        }
    }

    /// Discover environments and open the file store. Fails if the host has no
    /// usable environment.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let registry = EnvironmentRegistry::discover(
            &config.environments,
            config.execution.base_environment.clone(),
        )?;
        let store = FileStore::new(&config.storage.files_dir, &config.server.public_url())?;
        Ok(Self::new(Arc::new(registry), ProcessRuntime::new(), store))
    }

    pub fn registry(&self) -> &EnvironmentRegistry {
        &self.registry
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Selectable environments, without the base environment
    pub fn environments(&self) -> BTreeMap<String, EnvironmentInfo> {
        self.registry.list()
    }

    pub fn health(&self) -> Health {
        Health {
            status: "ok".to_string(),
        }
    }

    /// Store an uploaded file and return its URL
    pub async fn upload(&self, upload: &FileUpload, lifetime: Lifetime) -> Result<String> {
        tracing::info!(
            filename = %upload.full_filename(),
            ?lifetime,
            "Request to upload file"
        );
        self.store.upload(upload, lifetime).await
    }

    /// Execute a validated request. Never fails: every problem is reported in
    /// the returned outcome, and the session is torn down on every path.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
        tracing::info!(
            request_id = %request.request_id,
            user = %request.user,
            environment = %request.environment,
            timeout = request.timeout,
            received_at = %request.created_at.format("%Y-%m-%d %H:%M:%S"),
            "Request to execute code"
        );

        if self.registry.is_base(&request.environment) {
            return ExecutionOutcome::failure(
                SandboxError::EnvironmentUnsupported(request.environment).to_string(),
            );
        }
        if request.code.is_empty() {
            return ExecutionOutcome::failure("No code provided to run");
        }

        let mut session =
            match ExecutionSession::create(&self.registry, &request.environment, &*self.launcher) {
                Ok(session) => session,
                Err(e) => return unexpected(&request.request_id, anyhow::Error::from(e)),
            };

        let result = AssertUnwindSafe(self.execute_in(&mut session, &request))
            .catch_unwind()
            .await;
        session.terminate().await;

        match result {
            Ok(Ok(outcome)) => {
                tracing::info!(
                    request_id = %request.request_id,
                    error = outcome.is_error(),
                    timed_out = outcome.timedout,
                    files = outcome.files.as_ref().map_or(0, Vec::len),
                    "Execution finished"
                );
                outcome
            }
            Ok(Err(e)) => unexpected(&request.request_id, anyhow::Error::from(e)),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "execution task panicked".to_string());
                unexpected(&request.request_id, anyhow::anyhow!(message))
            }
        }
    }

    async fn execute_in(
        &self,
        session: &mut ExecutionSession,
        request: &ExecutionRequest,
    ) -> Result<ExecutionOutcome> {
        let timeout = Duration::from_secs(request.timeout);

        if let Some(attachments) = &request.attachments {
            session.stage(attachments).await?;
        }

        if let Some(packages) = request.packages.as_deref().filter(|p| !p.is_empty()) {
            if let Some(failure) = session.install(packages, timeout).await? {
                return Ok(failure.into_outcome());
            }
        }

        tracing::info!(request_id = %request.request_id, "Running code");
        let run = session.run(&request.code, timeout).await?;

        let files = if run.artifacts.is_empty() {
            None
        } else {
            let mut links = Vec::with_capacity(run.artifacts.len());
            for artifact in &run.artifacts {
                links.push(self.store.persist(artifact).await?);
            }
            Some(links)
        };

        Ok(ExecutionOutcome {
            output: Some(run.text),
            error: Some(ErrorField::Flag(run.error)),
            timedout: run.timed_out,
            files,
            stacktrace: None,
        })
    }
}

fn unexpected(request_id: &str, error: anyhow::Error) -> ExecutionOutcome {
    tracing::error!(request_id = %request_id, "Execution failed: {:?}", error);
    ExecutionOutcome {
        output: None,
        error: Some(ErrorField::Message(format!("An error occurred: {}", error))),
        timedout: false,
        files: None,
        stacktrace: Some(format!("{:?}", error)),
    }
}
