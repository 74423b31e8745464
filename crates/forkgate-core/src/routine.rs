//! The worker routine: the sequence executed by whichever side actually runs the work.
//!
//! signal setup → init → handshake → running=1 → gate → main → running=0 → finally
//!
//! Both guarded steps use drop guards so they also hold when a hook panics.

use crate::error::ProcessError;
use crate::naming::{HandshakeNames, Naming};
use crate::process::ProcessControl;
use crate::sync::{BoolSignal, ByteCell, NOT_RUNNING, RUNNING};
use crate::worker::{Context, Worker};
use tracing::{debug, info, warn};

/// Fires exactly one of the two handshake events
struct InitGuard<'a> {
    ok: &'a dyn BoolSignal,
    failed: &'a dyn BoolSignal,
    resolved: bool,
}

impl InitGuard<'_> {
    fn succeed(&mut self) {
        self.ok.fire();
        self.resolved = true;
    }
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.failed.fire();
        }
    }
}

/// Clears the running cell and calls `finally` on every exit from the main phase
struct Cleanup<'a, W: Worker, C: ByteCell> {
    worker: &'a mut W,
    running: &'a C,
    ctx: &'a Context<'a>,
}

impl<W: Worker, C: ByteCell> Drop for Cleanup<'_, W, C> {
    fn drop(&mut self) {
        self.running.write(NOT_RUNNING);
        self.worker.finally(self.ctx);
    }
}

pub(crate) fn run_worker<W: Worker, P: ProcessControl>(
    worker: &mut W,
    platform: &P,
    naming: &Naming,
    handshake: &HandshakeNames,
) -> Result<(), ProcessError> {
    let _span = tracing::info_span!("worker", kind = naming.kind(), instance = naming.instance())
        .entered();

    let stop = platform.open_signal(&naming.stop())?;
    let global_stop = platform.open_signal(&naming.global_stop())?;
    let running = platform.open_cell(&naming.running())?;
    let init_ok = platform.open_signal(&handshake.init_ok)?;
    let init_failed = platform.open_signal(&handshake.init_failed)?;
    let mut init_guard = InitGuard {
        ok: &init_ok,
        failed: &init_failed,
        resolved: false,
    };

    let _signals = platform.install_stop_handler(&stop)?;
    let ctx = Context::new(naming.instance(), &stop, &global_stop);

    if let Err(error) = worker.init(&ctx) {
        warn!("init hook failed: {error:#}");
        return Err(ProcessError::Init(error));
    }
    init_guard.succeed();
    debug!("init resolved");

    running.write(RUNNING);
    let mut cleanup = Cleanup {
        worker,
        running: &running,
        ctx: &ctx,
    };

    if !ctx.continue_running() {
        info!("stop requested before main, skipping it");
        return Ok(());
    }

    cleanup.worker.main(&ctx).map_err(|error| {
        warn!("main hook failed: {error:#}");
        ProcessError::Main(error)
    })
}
