//! coderun sandbox - execute code in isolated runtimes
//!
//! Each request gets its own runtime process and working directory. The
//! message loop drives the runtime until it goes idle or stays silent for
//! longer than the request's timeout, files the code produced are persisted
//! to a shared store, and a background sweeper expires them.

mod artifacts;
mod collector;
pub mod config;
mod error;
mod installer;
mod protocol;
mod registry;
mod runtime;
mod service;
mod session;
mod store;
mod sweeper;
mod types;

pub use artifacts::capture;
pub use collector::{
    drive, drive_shell, strip_ansi, CellOutput, Completion, OutputCollector, TIMEOUT_NOTE,
};
pub use config::{AppConfig, CodeInput, Ecosystem, EnvironmentConfig};
pub use error::{Result, SandboxError};
pub use installer::{install_command, InstallFailure};
pub use protocol::{ExecutionState, ProtocolMessage, StreamName};
pub use registry::{ecosystem_for_tag, Environment, EnvironmentInfo, EnvironmentRegistry};
pub use runtime::{
    Kernel, KernelLauncher, MessageStream, ProcessKernel, ProcessRuntime, RecvError,
};
pub use service::ExecutionService;
pub use session::ExecutionSession;
pub use store::{persisted_name, FileStore, Lifetime, TtlPolicy, LONG_LIVED_MARKER};
pub use sweeper::{sweep_dir, FileSweeper, SweepReport, SweeperHandle};
pub use types::{
    Artifact, ErrorField, ExecutionOutcome, ExecutionRequest, FileLink, FileUpload, Health,
    RunOutput, EXECUTION_ENVIRONMENTS, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS,
};
