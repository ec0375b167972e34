use thiserror::Error;

/// Errors raised inside the execution core
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Base environment is not supported for code execution")]
    EnvironmentUnsupported(String),

    #[error("Unknown execution environment: {0}")]
    UnknownEnvironment(String),

    #[error("Session has already been terminated")]
    SessionTerminated,

    #[error("Failed to spawn runtime process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid Base64 content: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
