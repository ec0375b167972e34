//! Process-based runtime

use super::{Kernel, KernelLauncher, MessageStream};
use crate::config::CodeInput;
use crate::error::SandboxError;
use crate::protocol::{ExecutionState, ProtocolMessage};
use crate::registry::Environment;
use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CHANNEL_CAPACITY: usize = 128;

/// Launches [`ProcessKernel`]s
pub struct ProcessRuntime {
    shell: String,
}

impl ProcessRuntime {
    pub fn new() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
        }
    }

    /// Shell used for [`Kernel::execute_shell`]
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelLauncher for ProcessRuntime {
    fn launch(&self, environment: &Environment, workdir: &Path) -> Result<Box<dyn Kernel>> {
        if !workdir.is_dir() {
            return Err(SandboxError::Config(format!(
                "Working directory {} does not exist",
                workdir.display()
            )));
        }
        Ok(Box::new(ProcessKernel {
            environment: environment.clone(),
            shell: self.shell.clone(),
            workdir: workdir.to_path_buf(),
            cancel: CancellationToken::new(),
            pumps: Vec::new(),
        }))
    }

    fn name(&self) -> &str {
        "process"
    }
}

/// Runs every cell as a child process of the environment's interpreter.
///
/// Stdout and stderr lines are forwarded as `stream` messages as they arrive.
/// A non-zero exit adds an `error` message whose value is the last stderr
/// line. Each cell ends with an `idle` status.
pub struct ProcessKernel {
    environment: Environment,
    shell: String,
    workdir: PathBuf,
    cancel: CancellationToken,
    pumps: Vec<JoinHandle<()>>,
}

impl ProcessKernel {
    fn command_for(&self, code: &str) -> (Command, Option<String>) {
        let mut command = Command::new(&self.environment.program);
        command.args(&self.environment.args);
        match self.environment.input {
            CodeInput::Argument => {
                command.arg(code);
                (command, None)
            }
            CodeInput::Stdin => (command, Some(code.to_string())),
        }
    }

    fn spawn(&mut self, mut command: Command, stdin_payload: Option<String>) -> Result<MessageStream> {
        command
            .current_dir(&self.workdir)
            .stdin(if stdin_payload.is_some() {
                std::process::Stdio::piped()
            } else {
                std::process::Stdio::null()
            })
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(SandboxError::Spawn)?;
        tracing::debug!(
            environment = %self.environment.tag,
            pid = child.id(),
            workdir = %self.workdir.display(),
            "Spawned runtime process"
        );

        if let (Some(payload), Some(mut stdin)) = (stdin_payload, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    tracing::debug!("Failed to write code to stdin: {}", e);
                }
                let _ = stdin.shutdown().await;
            });
        }

        let (tx, stream) = MessageStream::channel(CHANNEL_CAPACITY);
        let cancel = self.cancel.child_token();
        self.pumps.retain(|pump| !pump.is_finished());
        self.pumps.push(tokio::spawn(pump(child, tx, cancel)));

        Ok(stream)
    }

    async fn stop_pumps(&mut self) {
        self.cancel.cancel();
        for pump in self.pumps.drain(..) {
            if let Err(e) = pump.await {
                tracing::warn!("Runtime pump task failed: {}", e);
            }
        }
    }
}

#[async_trait]
impl Kernel for ProcessKernel {
    async fn execute(&mut self, code: &str) -> Result<MessageStream> {
        let (command, stdin_payload) = self.command_for(code);
        self.spawn(command, stdin_payload)
    }

    async fn execute_shell(&mut self, command: &str) -> Result<MessageStream> {
        let mut shell = Command::new(&self.shell);
        shell.arg("-c").arg(command);
        self.spawn(shell, None)
    }

    async fn interrupt(&mut self) {
        self.stop_pumps().await;
        self.cancel = CancellationToken::new();
    }

    async fn shutdown(&mut self) {
        self.stop_pumps().await;
    }

    fn name(&self) -> &str {
        &self.environment.tag
    }
}

impl Drop for ProcessKernel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn next_line<R>(lines: &mut Option<Lines<BufReader<R>>>) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await,
        None => Ok(None),
    }
}

/// Translate one child process into protocol messages
async fn pump(mut child: Child, tx: mpsc::Sender<ProtocolMessage>, cancel: CancellationToken) {
    if tx
        .send(ProtocolMessage::status(ExecutionState::Busy))
        .await
        .is_err()
    {
        return;
    }

    let mut stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
    let mut stderr = child.stderr.take().map(|s| BufReader::new(s).lines());
    let mut stdout_open = stdout.is_some();
    let mut stderr_open = stderr.is_some();
    let mut last_stderr = None;

    while stdout_open || stderr_open {
        let msg = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return;
            }
            line = next_line(&mut stdout), if stdout_open => match line {
                Ok(Some(line)) => ProtocolMessage::stdout(line),
                _ => {
                    stdout_open = false;
                    continue;
                }
            },
            line = next_line(&mut stderr), if stderr_open => match line {
                Ok(Some(line)) => {
                    last_stderr = Some(line.clone());
                    ProtocolMessage::stderr(line)
                }
                _ => {
                    stderr_open = false;
                    continue;
                }
            },
        };
        if tx.send(msg).await.is_err() {
            // Collector gave up on this cell
            let _ = child.kill().await;
            return;
        }
    }

    let status = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            return;
        }
        status = child.wait() => status,
    };

    let failure = match status {
        Ok(status) if status.success() => None,
        Ok(status) => {
            let exit = match status.code() {
                Some(code) => format!("process exited with code {}", code),
                None => "process terminated by signal".to_string(),
            };
            let evalue = last_stderr.unwrap_or_else(|| exit.clone());
            Some(ProtocolMessage::error("ExitStatus", evalue, vec![exit]))
        }
        Err(e) => Some(ProtocolMessage::error(
            "ProcessError",
            e.to_string(),
            vec![format!("failed to wait for process: {}", e)],
        )),
    };

    if let Some(msg) = failure {
        if tx.send(msg).await.is_err() {
            return;
        }
    }
    let _ = tx.send(ProtocolMessage::status(ExecutionState::Idle)).await;
}
