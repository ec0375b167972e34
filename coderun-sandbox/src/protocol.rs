//! Messages a kernel emits while it executes a cell

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kernel execution state carried by status messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Starting,
    Busy,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

/// One protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type", content = "content", rename_all = "snake_case")]
pub enum ProtocolMessage {
    Status {
        execution_state: ExecutionState,
    },
    Stream {
        name: StreamName,
        text: String,
    },
    /// Value of the last expression, keyed by mime type
    ExecuteResult {
        data: HashMap<String, String>,
    },
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

impl ProtocolMessage {
    pub fn status(execution_state: ExecutionState) -> Self {
        Self::Status { execution_state }
    }

    pub fn stdout(text: impl Into<String>) -> Self {
        Self::Stream {
            name: StreamName::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self::Stream {
            name: StreamName::Stderr,
            text: text.into(),
        }
    }

    /// An `execute_result` with only a `text/plain` representation
    pub fn plain_result(text: impl Into<String>) -> Self {
        let mut data = HashMap::new();
        data.insert("text/plain".to_string(), text.into());
        Self::ExecuteResult { data }
    }

    pub fn error(
        ename: impl Into<String>,
        evalue: impl Into<String>,
        traceback: Vec<String>,
    ) -> Self {
        Self::Error {
            ename: ename.into(),
            evalue: evalue.into(),
            traceback,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(
            self,
            Self::Status {
                execution_state: ExecutionState::Idle
            }
        )
    }
}
