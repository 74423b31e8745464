use crate::process::{ChildState, WorkerPid};
use std::time::Duration;
use thiserror::Error;

/// Error types for worker lifecycle operations
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("init hook failed: {0:#}")]
    Init(anyhow::Error),

    #[error("main hook failed: {0:#}")]
    Main(anyhow::Error),

    #[error("worker {pid} reported init failure")]
    StartFailed { pid: WorkerPid },

    #[error("worker {pid} exited before init resolved ({state})")]
    WorkerExited { pid: WorkerPid, state: ChildState },

    #[error("worker {pid} did not resolve init within {waited:?}")]
    HandshakeTimeout { pid: WorkerPid, waited: Duration },

    #[error("platform cannot fork worker processes")]
    ForkUnsupported,

    #[error("fork failed: {0}")]
    Fork(String),

    #[error("sync object `{name}` unavailable: {reason}")]
    SyncObject { name: String, reason: String },

    #[error("signal setup failed: {0}")]
    Signal(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ProcessError {
    pub fn sync_object(name: impl Into<String>, reason: impl ToString) -> Self {
        ProcessError::SyncObject {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if the worker never got past its init hook
    pub fn is_init_failure(&self) -> bool {
        matches!(self, ProcessError::Init(_) | ProcessError::StartFailed { .. })
    }

    /// Check if the handshake could not be resolved by either event
    pub fn is_liveness_failure(&self) -> bool {
        matches!(
            self,
            ProcessError::WorkerExited { .. } | ProcessError::HandshakeTimeout { .. }
        )
    }
}
