use crate::config::ProcessConfig;
use crate::error::ProcessError;
use crate::naming::{HandshakeNames, Identity, Naming};
use crate::poll::{self, PollConfig};
use crate::process::{
    ChildState, EXIT_HOOK_FAILED, EXIT_OK, EXIT_PANICKED, Forked, ProcessControl, WorkerPid,
};
use crate::routine;
use crate::sync::{BoolSignal, ByteCell, RUNNING, SyncBackend};
use crate::worker::Worker;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How a successful `start()` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Started {
    /// The whole routine ran in the caller and has completed
    Inline,
    /// A child is running the routine and its init hook succeeded
    Forked { pid: WorkerPid },
}

/// Worker-less handle on one `(kind, instance)` pair
///
/// Everything here goes through named objects, so a handle attached in an unrelated process
/// controls the same worker as the [`Process`] that launched it.
pub struct ProcessHandle<P> {
    naming: Naming,
    platform: Arc<P>,
}

impl<P> Clone for ProcessHandle<P> {
    fn clone(&self) -> Self {
        Self {
            naming: self.naming.clone(),
            platform: Arc::clone(&self.platform),
        }
    }
}

impl<P: SyncBackend> ProcessHandle<P> {
    pub fn attach<W: Worker>(platform: Arc<P>, instance: impl Into<String>) -> Self {
        Self::attach_kind(platform, W::kind(), instance)
    }

    pub fn attach_kind(
        platform: Arc<P>,
        kind: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            naming: Naming::new(kind, instance),
            platform,
        }
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Ask the worker to stop. Advisory: only gate checks made after this observe it.
    pub fn stop(&self) -> Result<(), ProcessError> {
        self.platform.open_signal(&self.naming.stop())?.fire();
        info!(
            kind = self.naming.kind(),
            instance = self.naming.instance(),
            "stop requested"
        );
        Ok(())
    }

    /// Ask every instance of this handle's kind to stop
    pub fn global_stop(&self) -> Result<(), ProcessError> {
        self.platform.open_signal(&self.naming.global_stop())?.fire();
        info!(kind = self.naming.kind(), "global stop requested");
        Ok(())
    }

    pub fn is_running(&self) -> Result<bool, ProcessError> {
        Ok(self.platform.open_cell(&self.naming.running())?.read() == RUNNING)
    }

    /// Whether the gate check would currently refuse to enter `main`
    pub fn is_stop_requested(&self) -> Result<bool, ProcessError> {
        let stop = self.platform.open_signal(&self.naming.stop())?;
        let global_stop = self.platform.open_signal(&self.naming.global_stop())?;
        Ok(stop.is_fired() || global_stop.is_fired())
    }

    /// Wait until the running cell no longer reads 1; `None` waits forever
    pub fn wait_stopped(&self, timeout: Option<Duration>) -> Result<bool, ProcessError> {
        let running = self.platform.open_cell(&self.naming.running())?;
        Ok(poll::wait_until(timeout, &PollConfig::default(), || {
            running.read() != RUNNING
        }))
    }

    pub async fn wait_stopped_async(&self, timeout: Option<Duration>) -> Result<bool, ProcessError> {
        let running = self.platform.open_cell(&self.naming.running())?;
        Ok(
            poll::wait_until_async(timeout, &PollConfig::default(), || {
                running.read() != RUNNING
            })
            .await,
        )
    }

    /// Remove this instance's stop and running names.
    ///
    /// Never done implicitly: the names are meant to outlive crashes so a respawned worker
    /// can still be stopped and observed.
    pub fn unlink(&self) -> Result<(), ProcessError> {
        self.platform.unlink(&self.naming.stop())?;
        self.platform.unlink(&self.naming.running())?;
        debug!(
            kind = self.naming.kind(),
            instance = self.naming.instance(),
            "unlinked instance sync objects"
        );
        Ok(())
    }
}

/// A worker plus everything needed to launch and supervise it
///
/// # Example
///
/// ```rust,no_run
/// use forkgate_core::{Context, LocalPlatform, Process, ProcessConfig, Worker};
/// use std::sync::Arc;
///
/// struct Once;
///
/// impl Worker for Once {
///     fn init(&mut self, _ctx: &Context<'_>) -> anyhow::Result<()> { Ok(()) }
///     fn main(&mut self, _ctx: &Context<'_>) -> anyhow::Result<()> { Ok(()) }
///     fn finally(&mut self, _ctx: &Context<'_>) {}
/// }
///
/// let mut process = Process::with_config(
///     Once,
///     ProcessConfig::inline("worker"),
///     Arc::new(LocalPlatform::new()),
/// );
/// process.start()?;
/// assert!(!process.is_running()?);
/// # Ok::<(), forkgate_core::ProcessError>(())
/// ```
pub struct Process<W: Worker, P: ProcessControl> {
    worker: W,
    config: ProcessConfig,
    handle: ProcessHandle<P>,
    identity: Identity,
    attempts: u64,
    last_handshake: Option<HandshakeNames>,
    reaped: Option<(WorkerPid, ChildState)>,
    unreclaimed: Option<(WorkerPid, HandshakeNames)>,
}

impl<W: Worker, P: ProcessControl> Process<W, P> {
    /// Forking worker with an empty instance name
    pub fn new(worker: W, platform: Arc<P>) -> Self {
        Self::with_config(worker, ProcessConfig::default(), platform)
    }

    pub fn with_config(worker: W, config: ProcessConfig, platform: Arc<P>) -> Self {
        let handle = ProcessHandle::attach::<W>(platform, config.name.clone());
        Self {
            worker,
            config,
            handle,
            identity: Identity::new(),
            attempts: 0,
            last_handshake: None,
            reaped: None,
            unreclaimed: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn worker(&self) -> &W {
        &self.worker
    }

    pub fn worker_mut(&mut self) -> &mut W {
        &mut self.worker
    }

    pub fn handle(&self) -> &ProcessHandle<P> {
        &self.handle
    }

    /// Handshake names used by the most recent `start()`
    pub fn last_handshake(&self) -> Option<&HandshakeNames> {
        self.last_handshake.as_ref()
    }

    /// Run the worker routine, inline or in a forked child.
    ///
    /// Inline, this returns once the routine has completed, with the hook error if any. Forked,
    /// it returns as soon as the child's init hook has resolved; the child's `main` keeps
    /// running independently. The child never returns from this call.
    pub fn start(&mut self) -> Result<Started, ProcessError> {
        self.config.validate()?;
        self.attempts += 1;
        let naming = self.handle.naming.clone();
        let handshake = naming.handshake(&self.identity.token(self.attempts));
        self.last_handshake = Some(handshake.clone());
        let platform = Arc::clone(&self.handle.platform);

        if !self.config.fork_enabled {
            info!(
                kind = naming.kind(),
                instance = naming.instance(),
                "running worker inline"
            );
            let result = routine::run_worker(&mut self.worker, &*platform, &naming, &handshake);
            self.reclaim(&handshake);
            return result.map(|()| Started::Inline);
        }

        let init_ok = platform.open_signal(&handshake.init_ok)?;
        let init_failed = platform.open_signal(&handshake.init_failed)?;

        match platform.fork()? {
            Forked::Child => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    routine::run_worker(&mut self.worker, &*platform, &naming, &handshake)
                }));
                let code = match outcome {
                    Ok(Ok(())) => EXIT_OK,
                    Ok(Err(e)) => {
                        error!("worker routine failed: {e}");
                        EXIT_HOOK_FAILED
                    }
                    Err(_) => EXIT_PANICKED,
                };
                platform.exit_child(code)
            }
            Forked::Parent(pid) => {
                info!(
                    kind = naming.kind(),
                    instance = naming.instance(),
                    %pid,
                    "forked worker, waiting for init"
                );
                let outcome = self.await_handshake(pid, &init_ok, &init_failed);
                if let Err(ProcessError::HandshakeTimeout { .. }) = outcome {
                    // The child may not have opened the handshake names yet; unlinking now
                    // would let it recreate them. Reclaimed by `join` instead.
                    self.unreclaimed = Some((pid, handshake));
                } else {
                    self.reclaim(&handshake);
                }
                outcome
            }
        }
    }

    fn await_handshake(
        &mut self,
        pid: WorkerPid,
        init_ok: &P::Signal,
        init_failed: &P::Signal,
    ) -> Result<Started, ProcessError> {
        let handshake = self.config.handshake.clone();
        let platform = Arc::clone(&self.handle.platform);
        let mut exited = None;

        poll::wait_until(handshake.timeout(), &handshake.poll(), || {
            if init_ok.is_fired() || init_failed.is_fired() {
                return true;
            }
            if handshake.detect_child_exit {
                match platform.child_state(pid) {
                    Ok(state) if state.has_exited() => {
                        exited = Some(state);
                        return true;
                    }
                    Ok(_) => {}
                    Err(e) => debug!(%pid, "cannot query worker state: {e}"),
                }
            }
            false
        });

        if let Some(state) = exited {
            self.reaped = Some((pid, state));
        }

        // The child may have fired and exited between the two checks above.
        if init_ok.is_fired() {
            info!(%pid, "worker init succeeded");
            return Ok(Started::Forked { pid });
        }
        if init_failed.is_fired() {
            warn!(%pid, "worker init failed");
            return Err(ProcessError::StartFailed { pid });
        }
        match exited {
            Some(state) => {
                error!(%pid, "worker exited without resolving init ({state})");
                Err(ProcessError::WorkerExited { pid, state })
            }
            None => {
                warn!(%pid, "worker did not resolve init in time");
                Err(ProcessError::HandshakeTimeout {
                    pid,
                    waited: handshake.timeout().unwrap_or_default(),
                })
            }
        }
    }

    fn reclaim(&self, handshake: &HandshakeNames) {
        if !self.config.reclaim_handshake {
            return;
        }
        for name in [&handshake.init_ok, &handshake.init_failed] {
            if let Err(e) = self.handle.platform.unlink(name) {
                warn!("failed to unlink handshake event {name}: {e}");
            }
        }
    }

    pub fn stop(&self) -> Result<(), ProcessError> {
        self.handle.stop()
    }

    pub fn is_running(&self) -> Result<bool, ProcessError> {
        self.handle.is_running()
    }

    /// Stop every instance of `W` that has not yet passed its gate check
    pub fn global_stop(platform: &Arc<P>) -> Result<(), ProcessError> {
        ProcessHandle::attach::<W>(Arc::clone(platform), "").global_stop()
    }

    /// Remove the kind-wide stop event so later instances of `W` may run again
    pub fn unlink_global_stop(platform: &Arc<P>) -> Result<(), ProcessError> {
        let naming = Naming::new(W::kind(), "");
        platform.unlink(&naming.global_stop())
    }

    /// Fire the stop event, then wait for the running cell to clear
    pub fn stop_and_wait(&self, timeout: Option<Duration>) -> Result<bool, ProcessError> {
        self.stop()?;
        self.handle.wait_stopped(timeout)
    }

    pub async fn stop_and_wait_async(&self, timeout: Option<Duration>) -> Result<bool, ProcessError> {
        self.stop()?;
        self.handle.wait_stopped_async(timeout).await
    }

    /// Block until a forked worker exits.
    ///
    /// Also reclaims the handshake names of a worker whose `start()` timed out.
    pub fn join(&mut self, pid: WorkerPid) -> Result<ChildState, ProcessError> {
        let state = match self.reaped.take_if(|(reaped, _)| *reaped == pid) {
            Some((_, state)) => state,
            None => {
                let state = self.handle.platform.wait_child(pid)?;
                debug!(%pid, "worker finished ({state})");
                state
            }
        };
        if let Some((_, handshake)) = self.unreclaimed.take_if(|(pending, _)| *pending == pid) {
            self.reclaim(&handshake);
        }
        Ok(state)
    }
}
