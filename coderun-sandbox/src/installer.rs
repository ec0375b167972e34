//! Package installation ahead of user code

use crate::config::Ecosystem;
use crate::session::ExecutionSession;
use crate::types::{ErrorField, ExecutionOutcome};
use crate::Result;
use std::time::Duration;

/// Why installation stopped before the user's code could run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallFailure {
    /// The environment has no package ecosystem
    Unsupported { environment: String },
    /// A package reported an error or went silent
    Failed {
        package: String,
        timed_out: bool,
        trace: String,
    },
}

impl InstallFailure {
    pub fn into_outcome(self) -> ExecutionOutcome {
        match self {
            InstallFailure::Unsupported { environment } => ExecutionOutcome::failure(format!(
                "Installations of additional packages is not supported for kernel {}",
                environment
            )),
            InstallFailure::Failed {
                timed_out, trace, ..
            } => ExecutionOutcome {
                output: None,
                error: Some(ErrorField::Flag(true)),
                timedout: timed_out,
                files: None,
                stacktrace: Some(trace),
            },
        }
    }
}

/// Shell command that installs `package`, quoted as one argument
pub fn install_command(ecosystem: Ecosystem, package: &str) -> String {
    let tool = match ecosystem {
        Ecosystem::Pip => "pip install",
        Ecosystem::Npm => "npm install",
    };
    format!("{} '{}'", tool, package)
}

fn is_valid_package(package: &str) -> bool {
    !package.is_empty()
        && !package.starts_with('-')
        && !package
            .chars()
            .any(|c| c == '\'' || c.is_whitespace() || c.is_control())
}

/// Install `packages` one at a time through the session's message loop.
///
/// Stops at the first failure; later packages are not attempted. Installs run
/// in the shell and leave the working directory untouched.
pub async fn install(
    session: &mut ExecutionSession,
    packages: &[String],
    timeout: Duration,
) -> Result<Option<InstallFailure>> {
    if packages.is_empty() {
        return Ok(None);
    }

    let environment = session.environment().tag.clone();
    let Some(ecosystem) = session.environment().ecosystem else {
        tracing::info!(environment = %environment, "Package installation not supported");
        return Ok(Some(InstallFailure::Unsupported { environment }));
    };

    for package in packages {
        if !is_valid_package(package) {
            return Ok(Some(InstallFailure::Failed {
                package: package.clone(),
                timed_out: false,
                trace: format!("Invalid package name: {:?}", package),
            }));
        }

        tracing::info!(environment = %environment, ?ecosystem, package = %package, "Installing package");
        let output = session
            .run_shell(&install_command(ecosystem, package), timeout)
            .await?;

        if output.error {
            tracing::warn!(
                package = %package,
                timed_out = output.timed_out,
                "Package installation failed"
            );
            return Ok(Some(InstallFailure::Failed {
                package: package.clone(),
                timed_out: output.timed_out,
                trace: output.text,
            }));
        }
    }

    Ok(None)
}
