//! Message loop: drains a kernel's protocol messages into one cell result

use crate::protocol::{ExecutionState, ProtocolMessage};
use crate::runtime::{Kernel, MessageStream, RecvError};
use crate::Result;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Appended to the output when the silence budget runs out
pub const TIMEOUT_NOTE: &str = "Timeout waiting for cell execution";

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The kernel reported `idle`
    Normal,
    /// No message arrived within the silence budget
    Timeout,
    /// The transport failed
    Fatal,
}

/// Result of driving one cell to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellOutput {
    pub text: String,
    pub error: bool,
    pub timed_out: bool,
    pub completion: Completion,
}

fn ansi_escape() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1b\[.*?m").expect("valid ANSI regex"))
}

/// Remove terminal color sequences from a traceback
pub fn strip_ansi(text: &str) -> String {
    ansi_escape().replace_all(text, "").into_owned()
}

/// Accumulates output fragments and flags while messages arrive
#[derive(Debug, Default)]
pub struct OutputCollector {
    fragments: Vec<String>,
    error: bool,
    timed_out: bool,
}

impl OutputCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one message. Returns `Some` once the cell has finished.
    pub fn observe(&mut self, msg: ProtocolMessage) -> Option<Completion> {
        match msg {
            ProtocolMessage::ExecuteResult { mut data } => {
                if let Some(text) = data.remove("text/plain") {
                    self.fragments.push(text);
                }
                None
            }
            ProtocolMessage::Stream { text, .. } => {
                self.fragments.push(text);
                None
            }
            ProtocolMessage::Error { traceback, .. } => {
                self.error = true;
                self.fragments.push(strip_ansi(&traceback.join("\n")));
                None
            }
            ProtocolMessage::Status { execution_state } => {
                (execution_state == ExecutionState::Idle).then_some(Completion::Normal)
            }
        }
    }

    pub fn mark_timeout(&mut self) {
        self.fragments.push(TIMEOUT_NOTE.to_string());
        self.error = true;
        self.timed_out = true;
    }

    /// Fragments joined by newlines, trimmed
    pub fn text(&self) -> String {
        self.fragments.join("\n").trim().to_string()
    }

    pub fn finish(self, completion: Completion) -> CellOutput {
        CellOutput {
            text: self.text(),
            error: self.error,
            timed_out: self.timed_out,
            completion,
        }
    }
}

/// Execute `code` and collect messages until the kernel goes idle.
///
/// `timeout` bounds the wait for each message, measured from the previous
/// one, not the total run time. Only a failure to start the cell is
/// returned as an error; transport failures while waiting end the loop and
/// are logged.
pub async fn drive(kernel: &mut dyn Kernel, code: &str, timeout: Duration) -> Result<CellOutput> {
    let stream = kernel.execute(code).await?;
    Ok(collect(stream, kernel.name(), timeout).await)
}

/// [`drive`] for a shell command run beside the interpreter
pub async fn drive_shell(
    kernel: &mut dyn Kernel,
    command: &str,
    timeout: Duration,
) -> Result<CellOutput> {
    let stream = kernel.execute_shell(command).await?;
    Ok(collect(stream, kernel.name(), timeout).await)
}

async fn collect(mut stream: MessageStream, kernel: &str, timeout: Duration) -> CellOutput {
    let mut collector = OutputCollector::new();

    loop {
        match stream.next(timeout).await {
            Ok(msg) => {
                if let Some(completion) = collector.observe(msg) {
                    return collector.finish(completion);
                }
            }
            Err(RecvError::Timeout) => {
                tracing::warn!(
                    kernel,
                    timeout_secs = timeout.as_secs(),
                    "No message within silence budget"
                );
                collector.mark_timeout();
                return collector.finish(Completion::Timeout);
            }
            Err(e @ RecvError::Closed) => {
                tracing::error!(kernel, "Message loop aborted: {}", e);
                return collector.finish(Completion::Fatal);
            }
        }
    }
}
