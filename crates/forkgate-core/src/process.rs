use crate::error::ProcessError;
use crate::sync::SyncBackend;
use std::fmt;

/// Exit code of a forked worker whose routine completed
pub const EXIT_OK: i32 = 0;
/// Exit code of a forked worker whose init or main hook returned an error
pub const EXIT_HOOK_FAILED: i32 = 1;
/// Exit code of a forked worker whose routine panicked
pub const EXIT_PANICKED: i32 = 101;

/// OS process id of a forked worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerPid(pub i32);

impl fmt::Display for WorkerPid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observed state of a forked worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    /// Process has not exited yet
    Running,
    /// Process exited normally with the given exit code
    Exited(i32),
    /// Process was terminated by the given signal number
    Signaled(i32),
}

impl ChildState {
    pub fn has_exited(&self) -> bool {
        !matches!(self, ChildState::Running)
    }

    pub fn success(&self) -> bool {
        matches!(self, ChildState::Exited(EXIT_OK))
    }
}

impl fmt::Display for ChildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildState::Running => write!(f, "still running"),
            ChildState::Exited(code) => write!(f, "exit code {code}"),
            ChildState::Signaled(signal) => write!(f, "killed by signal {signal}"),
        }
    }
}

/// Which side of a fork the caller is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forked {
    Parent(WorkerPid),
    Child,
}

/// Process-level operations a platform must provide on top of its named sync objects
///
/// The worker routine is written against this trait only, so the orchestration in
/// [`crate::Process`] never touches OS APIs directly.
pub trait ProcessControl: SyncBackend {
    /// Restores the previous signal dispositions when dropped
    type StopGuard;

    /// Route SIGINT and SIGTERM to `stop.fire()` instead of their default lethal action.
    ///
    /// The handler must only perform async-signal-safe work.
    fn install_stop_handler(&self, stop: &Self::Signal) -> Result<Self::StopGuard, ProcessError>;

    /// Fork the current process.
    ///
    /// The child must not return into arbitrary caller code: it is expected to run the worker
    /// routine and then call [`ProcessControl::exit_child`].
    fn fork(&self) -> Result<Forked, ProcessError>;

    /// Terminate the current (child) process immediately, skipping atexit handlers
    fn exit_child(&self, code: i32) -> !;

    /// Non-blocking status check; reaps the child if it has exited
    fn child_state(&self, pid: WorkerPid) -> Result<ChildState, ProcessError>;

    /// Block until the child exits and reap it
    fn wait_child(&self, pid: WorkerPid) -> Result<ChildState, ProcessError>;
}
