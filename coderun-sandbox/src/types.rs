//! Core types for sandbox execution

use crate::error::{Result, SandboxError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Environment tags a request may select
pub const EXECUTION_ENVIRONMENTS: &[&str] =
    &["python", "python_scientific", "bash", "java", "javascript"];

/// Timeouts must be strictly greater than this many seconds
pub const MIN_TIMEOUT_SECS: u64 = 1;

/// Timeouts may not exceed this many seconds
pub const MAX_TIMEOUT_SECS: u64 = 120;

/// Upper bound on the decoded size of all attachments of one request
pub const MAX_ATTACHMENT_BYTES: usize = 100 * 1024 * 1024;

fn default_timeout() -> u64 {
    60
}

fn default_environment() -> String {
    "python".to_string()
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Request to execute code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The code to execute
    pub code: String,

    /// Environment tag, one of [`EXECUTION_ENVIRONMENTS`]
    #[serde(default = "default_environment", alias = "execution_environment")]
    pub environment: String,

    /// Silence budget in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Packages to install before the code runs
    #[serde(default)]
    pub packages: Option<Vec<String>>,

    /// Files staged into the working directory before execution
    #[serde(default, alias = "files")]
    pub attachments: Option<Vec<FileUpload>>,

    /// The user who is executing the code
    pub user: String,

    #[serde(default = "new_request_id")]
    pub request_id: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ExecutionRequest {
    /// Create a request with default timeout and the default environment
    pub fn new(code: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            environment: default_environment(),
            timeout: default_timeout(),
            packages: None,
            attachments: None,
            user: user.into(),
            request_id: new_request_id(),
            created_at: Utc::now(),
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Set timeout in seconds
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    pub fn with_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages = Some(packages.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_attachment(mut self, upload: FileUpload) -> Self {
        self.attachments.get_or_insert_with(Vec::new).push(upload);
        self
    }

    /// Normalize and check the request. The environment tag is lower-cased.
    pub fn validate(mut self) -> Result<Self> {
        self.environment = self.environment.to_lowercase();
        if !EXECUTION_ENVIRONMENTS.contains(&self.environment.as_str()) {
            return Err(SandboxError::Validation(format!(
                "Invalid execution environment: {}",
                self.environment
            )));
        }

        if self.timeout <= MIN_TIMEOUT_SECS {
            return Err(SandboxError::Validation(format!(
                "Timeout must be greater than {}",
                MIN_TIMEOUT_SECS
            )));
        }
        if self.timeout > MAX_TIMEOUT_SECS {
            return Err(SandboxError::Validation(format!(
                "Timeout must be at most {}",
                MAX_TIMEOUT_SECS
            )));
        }

        if let Some(attachments) = &self.attachments {
            if attachments.is_empty() {
                return Err(SandboxError::Validation(
                    "Files must not be empty".to_string(),
                ));
            }
            let mut total = 0usize;
            for upload in attachments {
                total += upload.decoded_content()?.len();
            }
            if total > MAX_ATTACHMENT_BYTES {
                return Err(SandboxError::Validation(
                    "Total size of files must not exceed 100MB".to_string(),
                ));
            }
        }

        Ok(self)
    }
}

/// A file sent by a caller, either as an attachment or a direct upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUpload {
    pub filename: String,
    pub extension: String,
    /// Raw text, or Base64 when `base64encoded` is set
    pub content: String,
    pub base64encoded: bool,
}

impl FileUpload {
    pub fn from_bytes(
        filename: impl Into<String>,
        extension: impl Into<String>,
        bytes: &[u8],
    ) -> Self {
        Self {
            filename: filename.into(),
            extension: extension.into(),
            content: BASE64.encode(bytes),
            base64encoded: true,
        }
    }

    pub fn decoded_content(&self) -> Result<Vec<u8>> {
        if self.base64encoded {
            Ok(BASE64.decode(self.content.as_bytes())?)
        } else {
            Ok(self.content.as_bytes().to_vec())
        }
    }

    pub fn full_filename(&self) -> String {
        if self.extension.is_empty() {
            self.filename.clone()
        } else {
            format!("{}.{}", self.filename, self.extension)
        }
    }
}

/// A file produced by executed code, Base64-encoded for transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub filename: String,
    pub content: String,
}

impl Artifact {
    pub fn encode(filename: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            filename: filename.into(),
            content: BASE64.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        Ok(BASE64.decode(self.content.as_bytes())?)
    }
}

/// What the message loop produced for one `execute`
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub text: String,
    pub error: bool,
    pub artifacts: Vec<Artifact>,
    pub timed_out: bool,
}

/// Error slot of an outcome: a bare flag or a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorField {
    Flag(bool),
    Message(String),
}

/// Link to a persisted artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLink {
    pub filename: String,
    pub url: String,
}

/// Response for one execution request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub output: Option<String>,
    pub error: Option<ErrorField>,
    pub timedout: bool,
    pub files: Option<Vec<FileLink>>,
    pub stacktrace: Option<String>,
}

impl ExecutionOutcome {
    /// An outcome carrying only an error message
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            output: None,
            error: Some(ErrorField::Message(message.into())),
            timedout: false,
            files: None,
            stacktrace: None,
        }
    }

    pub fn is_error(&self) -> bool {
        match &self.error {
            None | Some(ErrorField::Flag(false)) => false,
            Some(_) => true,
        }
    }
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
}
