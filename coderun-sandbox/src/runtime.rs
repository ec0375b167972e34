//! Runtime transport: kernels that execute code and report protocol messages

pub(crate) mod process;

use crate::protocol::ProtocolMessage;
use crate::registry::Environment;
use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub use process::{ProcessKernel, ProcessRuntime};

/// Why [`MessageStream::next`] returned without a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvError {
    #[error("no message within the silence budget")]
    Timeout,
    #[error("kernel closed the message channel")]
    Closed,
}

/// Messages produced by one `execute` call
pub struct MessageStream {
    rx: mpsc::Receiver<ProtocolMessage>,
}

impl MessageStream {
    pub fn new(rx: mpsc::Receiver<ProtocolMessage>) -> Self {
        Self { rx }
    }

    /// A bounded channel and the stream reading from it
    pub fn channel(buffer: usize) -> (mpsc::Sender<ProtocolMessage>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }

    /// Wait at most `timeout` for the next message
    pub async fn next(&mut self, timeout: Duration) -> std::result::Result<ProtocolMessage, RecvError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(msg)) => Ok(msg),
            Ok(None) => Err(RecvError::Closed),
            Err(_) => Err(RecvError::Timeout),
        }
    }
}

/// A running interpreter bound to one working directory
#[async_trait]
pub trait Kernel: Send {
    /// Start executing `code`; progress arrives on the returned stream
    async fn execute(&mut self, code: &str) -> Result<MessageStream>;

    /// Run a shell command in the working directory instead of the interpreter
    async fn execute_shell(&mut self, command: &str) -> Result<MessageStream>;

    /// Stop cells that are still running. The kernel stays usable.
    async fn interrupt(&mut self) {}

    /// Stop everything this kernel started. Safe to call more than once.
    async fn shutdown(&mut self);

    fn name(&self) -> &str;
}

/// Starts kernels for sessions
pub trait KernelLauncher: Send + Sync {
    /// `workdir` becomes the execution root of every process the kernel spawns
    fn launch(&self, environment: &Environment, workdir: &Path) -> Result<Box<dyn Kernel>>;

    fn name(&self) -> &str;
}
