use crate::shm::{self, ShmCell, ShmEvent};
use crate::signals::{self, StopSignalGuard};
use forkgate_core::{
    ChildState, Forked, ProcessControl, ProcessError, SyncBackend, SyncName, WorkerPid,
};
use nix::errno::Errno;
use nix::sys::mman;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid};
use tracing::{debug, info};

/// Unix platform: POSIX shared memory for named objects, `fork` for workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShmPlatform {
    prefix: String,
}

impl Default for ShmPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl ShmPlatform {
    pub const DEFAULT_PREFIX: &'static str = "forkgate";

    pub fn new() -> Self {
        Self::with_prefix(Self::DEFAULT_PREFIX)
    }

    /// Separate namespace, e.g. one per application or per test run
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.replace('/', "_"),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// OS-level object name for a logical name
    pub fn os_name(&self, name: &SyncName) -> String {
        shm::os_name(&self.prefix, name)
    }
}

impl SyncBackend for ShmPlatform {
    type Signal = ShmEvent;
    type Cell = ShmCell;

    fn open_signal(&self, name: &SyncName) -> Result<Self::Signal, ProcessError> {
        ShmEvent::open(&self.os_name(name), name.clone())
    }

    fn open_cell(&self, name: &SyncName) -> Result<Self::Cell, ProcessError> {
        ShmCell::open(&self.os_name(name), name.clone())
    }

    fn unlink(&self, name: &SyncName) -> Result<(), ProcessError> {
        let os_name = self.os_name(name);
        match mman::shm_unlink(os_name.as_str()) {
            Ok(()) => {
                debug!("unlinked {os_name}");
                Ok(())
            }
            Err(Errno::ENOENT) => Ok(()),
            Err(e) => Err(ProcessError::sync_object(os_name, e)),
        }
    }
}

fn child_state(status: WaitStatus) -> ChildState {
    match status {
        WaitStatus::Exited(_, code) => ChildState::Exited(code),
        WaitStatus::Signaled(_, signal, _) => ChildState::Signaled(signal as i32),
        _ => ChildState::Running,
    }
}

fn wait_error(pid: WorkerPid, e: Errno) -> ProcessError {
    ProcessError::sync_object(format!("worker {pid}"), format!("waitpid failed: {e}"))
}

impl ProcessControl for ShmPlatform {
    type StopGuard = StopSignalGuard;

    fn install_stop_handler(&self, stop: &Self::Signal) -> Result<Self::StopGuard, ProcessError> {
        StopSignalGuard::install(stop)
    }

    fn fork(&self) -> Result<Forked, ProcessError> {
        match signals::fork() {
            Ok(ForkResult::Parent { child }) => Ok(Forked::Parent(WorkerPid(child.as_raw()))),
            Ok(ForkResult::Child) => Ok(Forked::Child),
            Err(e) => Err(ProcessError::Fork(e.to_string())),
        }
    }

    fn exit_child(&self, code: i32) -> ! {
        debug!(code, "worker exiting");
        // SAFETY: `_exit` terminates immediately without running the parent's atexit handlers
        // or flushing stdio buffers inherited across the fork.
        unsafe { nix::libc::_exit(code) }
    }

    fn child_state(&self, pid: WorkerPid) -> Result<ChildState, ProcessError> {
        match waitpid(Pid::from_raw(pid.0), Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => Ok(child_state(status)),
            Err(e) => Err(wait_error(pid, e)),
        }
    }

    fn wait_child(&self, pid: WorkerPid) -> Result<ChildState, ProcessError> {
        loop {
            match waitpid(Pid::from_raw(pid.0), None) {
                Ok(status) => {
                    let state = child_state(status);
                    if state.has_exited() {
                        info!(%pid, "worker reaped ({state})");
                        return Ok(state);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(wait_error(pid, e)),
            }
        }
    }
}
